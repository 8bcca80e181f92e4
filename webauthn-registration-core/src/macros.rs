// Accessors for serde_cbor_2::Value variants. Each yields the provided error
// when the value is not of the expected type.

macro_rules! cbor_try_map {
    (
        $v:expr, $e:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Map(m) => Ok(m),
            _ => Err($e),
        }
    }};
}

macro_rules! cbor_try_array {
    (
        $v:expr, $e:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Array(m) => Ok(m),
            _ => Err($e),
        }
    }};
}

macro_rules! cbor_try_string {
    (
        $v:expr, $e:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Text(m) => Ok(m),
            _ => Err($e),
        }
    }};
}

macro_rules! cbor_try_bytes {
    (
        $v:expr, $e:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Bytes(m) => Ok(m),
            _ => Err($e),
        }
    }};
}

macro_rules! cbor_try_i128 {
    (
        $v:expr, $e:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Integer(m) => Ok(*m),
            _ => Err($e),
        }
    }};
}

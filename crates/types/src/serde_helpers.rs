//! Serde adapters for fields whose JSON form differs from their Rust form

/// `Vec<Vec<u8>>` as a list of hex strings, `0x` prefix optional on input.
pub mod hex_vec {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
        de::Error,
        ser::SerializeSeq,
    };

    /// Serializes each entry as a `0x` prefixed hex string.
    pub fn serialize<S>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&format!("0x{}", hex::encode(item)))?;
        }
        seq.end()
    }

    /// Deserializes a list of hex strings.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|s| hex::decode(s.strip_prefix("0x").unwrap_or(s.as_str())))
            .collect::<Result<_, _>>()
            .map_err(D::Error::custom)
    }
}

/// `u128` as a decimal string. Plain JSON numbers are accepted on input.
pub mod u128_string {
    use core::fmt;
    use serde::{
        Deserializer,
        Serializer,
        de::{
            Error,
            Visitor,
        },
    };

    /// Serializes the value as a decimal string.
    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    /// Deserializes a decimal string or an unsigned number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(U128Visitor)
    }

    struct U128Visitor;

    impl Visitor<'_> for U128Visitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an unsigned integer or a decimal string")
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<u128, E> {
            Ok(v.into())
        }

        fn visit_u128<E: Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<u128, E> {
            v.parse().map_err(E::custom)
        }
    }
}

/// Serde helpers for `U256` amounts rendered as base-10 strings.
///
/// Wei balances and gas totals do not fit into a JSON number, and the hex form
/// `ethers` uses by default is unreadable for operators. Deserialization
/// accepts either a decimal or a `0x`-prefixed hex string.
pub mod u256_decimal {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(x: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&x.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let buf = String::deserialize(d)?;
        parse(&buf).map_err(serde::de::Error::custom)
    }

    pub fn parse(value: &str) -> Result<U256, String> {
        let value = value.trim();
        match value.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
            None => U256::from_dec_str(value).map_err(|e| e.to_string()),
        }
    }
}

/// Same as [`u256_decimal`] for optional amounts.
pub mod u256_decimal_opt {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(x: &Option<U256>, s: S) -> Result<S::Ok, S::Error> {
        match x {
            Some(v) => s.serialize_some(&v.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<U256>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|v| super::u256_decimal::parse(&v).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::U256;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Amounts {
        #[serde(with = "u256_decimal")]
        gas_used: U256,
        #[serde(with = "u256_decimal_opt")]
        balance: Option<U256>,
    }

    #[test]
    fn renders_decimal_strings() {
        let amounts = Amounts {
            gas_used: U256::from(1_234_567u64),
            balance: Some(U256::exp10(18)),
        };
        let json = serde_json::to_value(&amounts).unwrap();
        assert_eq!(json["gasUsed"], "1234567");
        assert_eq!(json["balance"], "1000000000000000000");
    }

    #[test]
    fn accepts_hex_input() {
        let amounts: Amounts =
            serde_json::from_str(r#"{"gasUsed":"0x10","balance":null}"#).unwrap();
        assert_eq!(amounts.gas_used, U256::from(16));
        assert_eq!(amounts.balance, None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Amounts>(r#"{"gasUsed":"ten","balance":null}"#).is_err());
    }
}

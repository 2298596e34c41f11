//! Asset transfer payloads carried by bridge messages.

use std::fmt;

use ethers::{
    abi::{self, ParamType, Token},
    types::{Address, Bytes, U256},
};
use storage::TokenType;

use crate::{Error, Result};

/// Discriminant of a [`BridgePayload`] on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PayloadType {
    /// The chain's native coin.
    NativeCoin = 0,
    /// Fungible token.
    Erc20 = 1,
    /// Non-fungible token.
    Erc721 = 2,
    /// Multi-token.
    Erc1155 = 3,
    /// The bridge protocol's own token.
    ProtocolToken = 4,
}

impl PayloadType {
    /// Metric and log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::NativeCoin => "native_coin",
            PayloadType::Erc20 => "erc20",
            PayloadType::Erc721 => "erc721",
            PayloadType::Erc1155 => "erc1155",
            PayloadType::ProtocolToken => "protocol_token",
        }
    }

    /// Stored token type of messages carrying this payload.
    pub fn token_type(&self) -> TokenType {
        match self {
            PayloadType::NativeCoin => TokenType::NativeCoin,
            PayloadType::Erc20 => TokenType::Erc20,
            PayloadType::Erc721 => TokenType::Erc721,
            PayloadType::Erc1155 => TokenType::Erc1155,
            PayloadType::ProtocolToken => TokenType::ProtocolToken,
        }
    }

    fn params(&self) -> Vec<ParamType> {
        let transfer = || vec![ParamType::Address, ParamType::Address, ParamType::Uint(256)];
        let token_transfer = |last: Vec<ParamType>| {
            let mut params = vec![ParamType::Address; 4];
            params.extend(last);
            params
        };

        match self {
            PayloadType::NativeCoin | PayloadType::ProtocolToken => transfer(),
            PayloadType::Erc20 | PayloadType::Erc721 => token_transfer(vec![ParamType::Uint(256)]),
            PayloadType::Erc1155 => token_transfer(vec![
                ParamType::Array(Box::new(ParamType::Uint(256))),
                ParamType::Array(Box::new(ParamType::Uint(256))),
            ]),
        }
    }
}

impl TryFrom<u32> for PayloadType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => PayloadType::NativeCoin,
            1 => PayloadType::Erc20,
            2 => PayloadType::Erc721,
            3 => PayloadType::Erc1155,
            4 => PayloadType::ProtocolToken,
            other => return Err(Error::UnknownPayloadType(other)),
        })
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BridgePayload {
    NativeCoin {
        from: Address,
        to: Address,
        amount: U256,
    },
    Erc20 {
        l1_token: Address,
        l2_token: Address,
        from: Address,
        to: Address,
        amount: U256,
    },
    Erc721 {
        l1_token: Address,
        l2_token: Address,
        from: Address,
        to: Address,
        token_id: U256,
    },
    Erc1155 {
        l1_token: Address,
        l2_token: Address,
        from: Address,
        to: Address,
        token_ids: Vec<U256>,
        amounts: Vec<U256>,
    },
    ProtocolToken {
        from: Address,
        to: Address,
        amount: U256,
    },
}

fn malformed(payload_type: PayloadType, reason: impl ToString) -> Error {
    Error::MalformedPayload {
        payload_type: payload_type as u32,
        reason: reason.to_string(),
    }
}

struct Tokens {
    payload_type: PayloadType,
    inner: std::vec::IntoIter<Token>,
}

impl Tokens {
    fn next(&mut self) -> Result<Token> {
        self.inner
            .next()
            .ok_or_else(|| malformed(self.payload_type, "too few fields"))
    }

    fn address(&mut self) -> Result<Address> {
        let token = self.next()?;
        token
            .into_address()
            .ok_or_else(|| malformed(self.payload_type, "expected address"))
    }

    fn uint(&mut self) -> Result<U256> {
        let token = self.next()?;
        token
            .into_uint()
            .ok_or_else(|| malformed(self.payload_type, "expected uint256"))
    }

    fn uints(&mut self) -> Result<Vec<U256>> {
        let payload_type = self.payload_type;
        let token = self.next()?;
        token
            .into_array()
            .ok_or_else(|| malformed(payload_type, "expected uint256[]"))?
            .into_iter()
            .map(|t| {
                t.into_uint()
                    .ok_or_else(|| malformed(payload_type, "expected uint256[]"))
            })
            .collect()
    }
}

impl BridgePayload {
    /// Decodes an ABI-encoded payload of the given wire type.
    ///
    /// # Arguments
    ///
    /// * `payload_type`: The `payloadType` field of the message
    /// * `data`: The `payload` field of the message
    pub fn decode(payload_type: u32, data: &[u8]) -> Result<Self> {
        let payload_type = PayloadType::try_from(payload_type)?;
        let decoded =
            abi::decode(&payload_type.params(), data).map_err(|e| malformed(payload_type, e))?;

        let mut t = Tokens {
            payload_type,
            inner: decoded.into_iter(),
        };

        Ok(match payload_type {
            PayloadType::NativeCoin => BridgePayload::NativeCoin {
                from: t.address()?,
                to: t.address()?,
                amount: t.uint()?,
            },
            PayloadType::ProtocolToken => BridgePayload::ProtocolToken {
                from: t.address()?,
                to: t.address()?,
                amount: t.uint()?,
            },
            PayloadType::Erc20 => BridgePayload::Erc20 {
                l1_token: t.address()?,
                l2_token: t.address()?,
                from: t.address()?,
                to: t.address()?,
                amount: t.uint()?,
            },
            PayloadType::Erc721 => BridgePayload::Erc721 {
                l1_token: t.address()?,
                l2_token: t.address()?,
                from: t.address()?,
                to: t.address()?,
                token_id: t.uint()?,
            },
            PayloadType::Erc1155 => {
                let l1_token = t.address()?;
                let l2_token = t.address()?;
                let from = t.address()?;
                let to = t.address()?;
                let token_ids = t.uints()?;
                let amounts = t.uints()?;

                if token_ids.len() != amounts.len() {
                    return Err(malformed(
                        payload_type,
                        format!("{} ids but {} amounts", token_ids.len(), amounts.len()),
                    ));
                }

                BridgePayload::Erc1155 {
                    l1_token,
                    l2_token,
                    from,
                    to,
                    token_ids,
                    amounts,
                }
            }
        })
    }

    /// ABI-encodes the payload as carried by a message.
    pub fn encode(&self) -> Bytes {
        let uints = |v: &[U256]| Token::Array(v.iter().copied().map(Token::Uint).collect());

        let tokens = match self {
            BridgePayload::NativeCoin { from, to, amount }
            | BridgePayload::ProtocolToken { from, to, amount } => vec![
                Token::Address(*from),
                Token::Address(*to),
                Token::Uint(*amount),
            ],
            BridgePayload::Erc20 {
                l1_token,
                l2_token,
                from,
                to,
                amount: value,
            }
            | BridgePayload::Erc721 {
                l1_token,
                l2_token,
                from,
                to,
                token_id: value,
            } => vec![
                Token::Address(*l1_token),
                Token::Address(*l2_token),
                Token::Address(*from),
                Token::Address(*to),
                Token::Uint(*value),
            ],
            BridgePayload::Erc1155 {
                l1_token,
                l2_token,
                from,
                to,
                token_ids,
                amounts,
            } => vec![
                Token::Address(*l1_token),
                Token::Address(*l2_token),
                Token::Address(*from),
                Token::Address(*to),
                uints(token_ids),
                uints(amounts),
            ],
        };

        abi::encode(&tokens).into()
    }

    /// Wire type of the payload.
    pub fn payload_type(&self) -> PayloadType {
        match self {
            BridgePayload::NativeCoin { .. } => PayloadType::NativeCoin,
            BridgePayload::Erc20 { .. } => PayloadType::Erc20,
            BridgePayload::Erc721 { .. } => PayloadType::Erc721,
            BridgePayload::Erc1155 { .. } => PayloadType::Erc1155,
            BridgePayload::ProtocolToken { .. } => PayloadType::ProtocolToken,
        }
    }

    /// Asset owner on the source chain.
    pub fn from(&self) -> Address {
        match self {
            BridgePayload::NativeCoin { from, .. }
            | BridgePayload::Erc20 { from, .. }
            | BridgePayload::Erc721 { from, .. }
            | BridgePayload::Erc1155 { from, .. }
            | BridgePayload::ProtocolToken { from, .. } => *from,
        }
    }

    /// Asset receiver on the destination chain.
    pub fn to(&self) -> Address {
        match self {
            BridgePayload::NativeCoin { to, .. }
            | BridgePayload::Erc20 { to, .. }
            | BridgePayload::Erc721 { to, .. }
            | BridgePayload::Erc1155 { to, .. }
            | BridgePayload::ProtocolToken { to, .. } => *to,
        }
    }

    /// Token contracts on L1 and L2; zero for coin transfers.
    pub fn token_addresses(&self) -> (Address, Address) {
        match self {
            BridgePayload::NativeCoin { .. } | BridgePayload::ProtocolToken { .. } => {
                (Address::zero(), Address::zero())
            }
            BridgePayload::Erc20 {
                l1_token, l2_token, ..
            }
            | BridgePayload::Erc721 {
                l1_token, l2_token, ..
            }
            | BridgePayload::Erc1155 {
                l1_token, l2_token, ..
            } => (*l1_token, *l2_token),
        }
    }

    /// Transferred token ids; empty for fungible transfers.
    pub fn token_ids(&self) -> Vec<U256> {
        match self {
            BridgePayload::Erc721 { token_id, .. } => vec![*token_id],
            BridgePayload::Erc1155 { token_ids, .. } => token_ids.clone(),
            _ => vec![],
        }
    }

    /// Transferred amounts, one per token id for multi-token transfers.
    pub fn token_amounts(&self) -> Vec<U256> {
        match self {
            BridgePayload::NativeCoin { amount, .. }
            | BridgePayload::Erc20 { amount, .. }
            | BridgePayload::ProtocolToken { amount, .. } => vec![*amount],
            BridgePayload::Erc721 { .. } => vec![U256::one()],
            BridgePayload::Erc1155 { amounts, .. } => amounts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn erc1155_payload_is_decoded() {
        let payload = BridgePayload::Erc1155 {
            l1_token: Address::repeat_byte(1),
            l2_token: Address::repeat_byte(2),
            from: Address::repeat_byte(3),
            to: Address::repeat_byte(4),
            token_ids: vec![U256::from(7), U256::from(9)],
            amounts: vec![U256::from(100), U256::from(1)],
        };

        let decoded = BridgePayload::decode(3, &payload.encode()).unwrap();

        assert_eq!(decoded, payload);
        assert_eq!(decoded.payload_type().token_type(), TokenType::Erc1155);
        assert_eq!(
            decoded.token_addresses(),
            (Address::repeat_byte(1), Address::repeat_byte(2))
        );
        assert_eq!(decoded.token_ids(), vec![U256::from(7), U256::from(9)]);
    }

    #[test]
    fn erc721_reports_single_token() {
        let payload = BridgePayload::Erc721 {
            l1_token: Address::repeat_byte(1),
            l2_token: Address::repeat_byte(2),
            from: Address::repeat_byte(3),
            to: Address::repeat_byte(4),
            token_id: U256::from(42),
        };

        assert_eq!(payload.token_ids(), vec![U256::from(42)]);
        assert_eq!(payload.token_amounts(), vec![U256::one()]);
        assert_eq!(payload.from(), Address::repeat_byte(3));
        assert_eq!(payload.to(), Address::repeat_byte(4));
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        let err = BridgePayload::decode(9, &[]).unwrap_err();
        assert!(matches!(err, Error::UnknownPayloadType(9)));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let payload = BridgePayload::NativeCoin {
            from: Address::repeat_byte(3),
            to: Address::repeat_byte(4),
            amount: U256::from(5),
        }
        .encode();

        let err = BridgePayload::decode(0, &payload[..64]).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedPayload {
                payload_type: 0,
                ..
            }
        ));
    }
}

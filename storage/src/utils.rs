use ethers::types::{Address, Bytes, H256, U256};
use num::{
    bigint::{BigInt, Sign},
    BigUint,
};
use sqlx::types::BigDecimal;

use crate::{Error, Gap, Result};

/// Converts `U256` into the corresponding `BigUint` value.
fn u256_to_biguint(value: U256) -> BigUint {
    let mut bytes = [0u8; 32];
    value.to_little_endian(&mut bytes);
    BigUint::from_bytes_le(&bytes)
}

pub(crate) fn u256_to_big_decimal(value: U256) -> BigDecimal {
    BigDecimal::new(BigInt::from_biguint(Sign::Plus, u256_to_biguint(value)), 0)
}

pub(crate) fn big_decimal_to_u256(value: BigDecimal) -> Result<U256> {
    let (int, _) = value.with_scale(0).into_bigint_and_exponent();
    let (sign, bytes) = int.to_bytes_le();

    if sign == Sign::Minus || bytes.len() > 32 {
        return Err(Error::CorruptRow(format!("{int} does not fit into uint256")));
    }

    Ok(U256::from_little_endian(&bytes))
}

pub(crate) fn h256_from_slice(column: &str, bytes: &[u8]) -> Result<H256> {
    if bytes.len() != 32 {
        return Err(Error::CorruptRow(format!(
            "{column} is {} bytes long, expected 32",
            bytes.len()
        )));
    }
    Ok(H256::from_slice(bytes))
}

pub(crate) fn address_from_slice(column: &str, bytes: &[u8]) -> Result<Address> {
    if bytes.len() != 20 {
        return Err(Error::CorruptRow(format!(
            "{column} is {} bytes long, expected 20",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(bytes))
}

/// Token ids and amounts are stored as comma-joined decimal strings.
pub(crate) fn join_u256(values: &[U256]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn split_u256(joined: &str) -> Result<Vec<U256>> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            U256::from_dec_str(s).map_err(|e| Error::CorruptRow(format!("bad uint256 {s}: {e}")))
        })
        .collect()
}

/// Signatures are stored as comma-joined `0x`-prefixed hex blobs.
pub(crate) fn join_proofs(proofs: &[Bytes]) -> String {
    proofs
        .iter()
        .map(|p| format!("0x{}", hex::encode(p)))
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn split_proofs(joined: &str) -> Result<Vec<Bytes>> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            hex::decode(s.trim_start_matches("0x"))
                .map(Bytes::from)
                .map_err(|e| Error::CorruptRow(format!("bad signature {s}: {e}")))
        })
        .collect()
}

/// Finds the missing nonce ranges within `[start, end]`.
///
/// `present` holds `(nonce, block_number)` pairs sorted by nonce and may include
/// the nearest stored neighbours outside of the range, which bound the block
/// range of the gaps at the edges.
pub(crate) fn nonce_gaps(present: &[(u64, u64)], start: u64, end: u64) -> Vec<Gap> {
    let mut gaps = vec![];

    if start > end {
        return gaps;
    }

    let mut prev: Option<(u64, u64)> = None;
    let mut next_expected = start;

    for &(nonce, block) in present {
        if nonce < next_expected {
            prev = Some((nonce, block));
            continue;
        }

        if nonce > next_expected && next_expected <= end {
            gaps.push(Gap {
                start_nonce: next_expected,
                end_nonce: (nonce - 1).min(end),
                start_block: prev.map(|(_, b)| b).unwrap_or(0),
                end_block: block,
            });
        }

        if nonce >= end {
            return gaps;
        }

        prev = Some((nonce, block));
        next_expected = nonce + 1;
    }

    if next_expected <= end {
        gaps.push(Gap {
            start_nonce: next_expected,
            end_nonce: end,
            start_block: prev.map(|(_, b)| b).unwrap_or(0),
            end_block: u64::MAX,
        });
    }

    gaps
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn no_gaps_in_contiguous_range() {
        let present = [(5, 104), (6, 104), (7, 110)];
        assert_eq!(nonce_gaps(&present, 5, 7), vec![]);
    }

    #[test]
    fn single_missing_nonce_is_bounded_by_neighbours() {
        let present = [(5, 104), (7, 120)];
        assert_eq!(
            nonce_gaps(&present, 5, 7),
            vec![Gap {
                start_nonce: 6,
                end_nonce: 6,
                start_block: 104,
                end_block: 120,
            }]
        );
    }

    #[test]
    fn gap_at_range_end_uses_neighbour_beyond_range() {
        let present = [(1, 10), (2, 11), (9, 40)];
        assert_eq!(
            nonce_gaps(&present, 1, 5),
            vec![Gap {
                start_nonce: 3,
                end_nonce: 5,
                start_block: 11,
                end_block: 40,
            }]
        );
    }

    #[test]
    fn unbounded_edges() {
        assert_eq!(
            nonce_gaps(&[(4, 30)], 2, 6),
            vec![
                Gap {
                    start_nonce: 2,
                    end_nonce: 3,
                    start_block: 0,
                    end_block: 30,
                },
                Gap {
                    start_nonce: 5,
                    end_nonce: 6,
                    start_block: 30,
                    end_block: u64::MAX,
                },
            ]
        );
    }

    #[test]
    fn empty_range() {
        assert_eq!(nonce_gaps(&[(1, 1)], 3, 2), vec![]);
    }

    #[test]
    fn uint256_decimal_conversion() {
        let value = U256::MAX - 7;
        assert_eq!(big_decimal_to_u256(u256_to_big_decimal(value)).unwrap(), value);

        let ids = vec![U256::from(1), U256::from(42)];
        assert_eq!(join_u256(&ids), "1,42");
        assert_eq!(split_u256("1,42").unwrap(), ids);
        assert_eq!(split_u256("").unwrap(), vec![]);
    }

    #[test]
    fn proofs_roundtrip_through_text() {
        let proofs = vec![Bytes::from(vec![0xde, 0xad]), Bytes::from(vec![0xbe, 0xef])];
        let joined = join_proofs(&proofs);
        assert_eq!(joined, "0xdead,0xbeef");
        assert_eq!(split_proofs(&joined).unwrap(), proofs);
    }
}

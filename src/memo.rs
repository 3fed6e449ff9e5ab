//! Memo codec: bidirectional mapping between [`CrossChainPayload`] and its
//! chain-specific embeddings.
//!
//! Two embeddings exist:
//! - UTXO chains carry a compact length-prefixed record inside an
//!   unspendable OP_RETURN output, capped at the standard 80-byte
//!   data-carrier limit.
//! - Account chains carry a positional ABI-word record in an event log;
//!   every field's declared width is validated before use.
//!
//! Decode failures are never panics: a malformed memo means "not a bridge
//! transaction" to the caller.

use crate::error::MemoError;
use crate::types::{ChainId, CrossChainPayload};

/// Standard relay policy limit for an OP_RETURN data push.
pub const DATA_CARRIER_LIMIT: usize = 80;

/// Well-known marker for donation transactions sent to the deposit address
/// on purpose, with no relay intent.
pub const DONATION_MESSAGE: &[u8] = b"I am rich!";

const MEMO_VERSION: u8 = 0x01;
const MAX_ADDRESS_LEN: usize = 40;

const FLAG_GAS_LIMIT: u8 = 0x01;
const FLAG_MESSAGE: u8 = 0x02;

// ---------------------------------------------------------------------------
// UTXO embedding
// ---------------------------------------------------------------------------

/// Encode a payload into the compact UTXO memo record.
///
/// Record layout: version byte, source chain u32, destination chain u32,
/// length-prefixed destination address, amount u64, flags byte, then the
/// optional gas limit (u64) and length-prefixed message when their flag bits
/// are set. All integers big-endian.
pub fn encode_utxo_memo(payload: &CrossChainPayload) -> Result<Vec<u8>, MemoError> {
    let addr_len = payload.dest_address.len();
    if addr_len == 0 || addr_len > MAX_ADDRESS_LEN {
        return Err(MemoError::FieldWidth {
            field: "dest_address",
            width: addr_len,
        });
    }
    let amount: u64 = payload
        .amount
        .try_into()
        .map_err(|_| MemoError::Overflow("amount"))?;

    let mut out = Vec::with_capacity(DATA_CARRIER_LIMIT);
    out.push(MEMO_VERSION);
    out.extend_from_slice(&payload.src_chain.0.to_be_bytes());
    out.extend_from_slice(&payload.dest_chain.0.to_be_bytes());
    out.push(addr_len as u8);
    out.extend_from_slice(&payload.dest_address);
    out.extend_from_slice(&amount.to_be_bytes());

    let mut flags = 0u8;
    if payload.gas_limit.is_some() {
        flags |= FLAG_GAS_LIMIT;
    }
    if payload.message.is_some() {
        flags |= FLAG_MESSAGE;
    }
    out.push(flags);

    if let Some(gas) = payload.gas_limit {
        out.extend_from_slice(&gas.to_be_bytes());
    }
    if let Some(ref msg) = payload.message {
        if msg.len() > u8::MAX as usize {
            return Err(MemoError::FieldWidth {
                field: "message",
                width: msg.len(),
            });
        }
        out.push(msg.len() as u8);
        out.extend_from_slice(msg);
    }

    if out.len() > DATA_CARRIER_LIMIT {
        return Err(MemoError::Oversize {
            len: out.len(),
            max: DATA_CARRIER_LIMIT,
        });
    }
    Ok(out)
}

/// Decode the compact UTXO memo record. Rejects truncation, unknown
/// versions, and trailing bytes; recognizes the donation marker.
pub fn decode_utxo_memo(data: &[u8]) -> Result<CrossChainPayload, MemoError> {
    if data == DONATION_MESSAGE {
        return Err(MemoError::Donation);
    }

    let mut r = Reader::new(data);
    let version = r.u8()?;
    if version != MEMO_VERSION {
        return Err(MemoError::Version(version));
    }

    let src_chain = ChainId(r.u32()?);
    let dest_chain = ChainId(r.u32()?);

    let addr_len = r.u8()? as usize;
    if addr_len == 0 || addr_len > MAX_ADDRESS_LEN {
        return Err(MemoError::FieldWidth {
            field: "dest_address",
            width: addr_len,
        });
    }
    let dest_address = r.bytes(addr_len)?.to_vec();
    let amount = r.u64()? as u128;
    let flags = r.u8()?;

    let gas_limit = if flags & FLAG_GAS_LIMIT != 0 {
        Some(r.u64()?)
    } else {
        None
    };
    let message = if flags & FLAG_MESSAGE != 0 {
        let len = r.u8()? as usize;
        Some(r.bytes(len)?.to_vec())
    } else {
        None
    };

    if r.remaining() != 0 {
        return Err(MemoError::TrailingBytes(r.remaining()));
    }

    Ok(CrossChainPayload {
        src_chain,
        dest_chain,
        dest_address,
        amount,
        message,
        gas_limit,
    })
}

/// Extract the data push from an OP_RETURN script, if the script is one.
///
/// Accepts the direct-push form (`6a <len> <data>`, len <= 75) and the
/// OP_PUSHDATA1 form (`6a 4c <len> <data>`).
pub fn extract_op_return(script: &[u8]) -> Option<&[u8]> {
    if script.first() != Some(&0x6a) {
        return None;
    }
    match script.get(1)? {
        &len if len <= 75 => {
            let len = len as usize;
            let data = script.get(2..2 + len)?;
            if script.len() == 2 + len {
                Some(data)
            } else {
                None
            }
        }
        0x4c => {
            let len = *script.get(2)? as usize;
            let data = script.get(3..3 + len)?;
            if script.len() == 3 + len {
                Some(data)
            } else {
                None
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Account-chain embedding
// ---------------------------------------------------------------------------

const WORD: usize = 32;
const HEAD_WORDS: usize = 7;

/// Encode a payload as the positional ABI-word event record.
///
/// Head words: source chain, destination chain, amount, gas limit value,
/// offset of the destination-address tail, offset of the message tail,
/// presence flags. Tails are length-prefixed and zero-padded to word
/// boundaries, address first.
pub fn encode_event_record(payload: &CrossChainPayload) -> Result<Vec<u8>, MemoError> {
    if payload.dest_address.is_empty() {
        return Err(MemoError::FieldWidth {
            field: "dest_address",
            width: 0,
        });
    }

    let addr_tail = WORD + padded_len(payload.dest_address.len());
    let addr_offset = HEAD_WORDS * WORD;
    let msg_offset = addr_offset + addr_tail;
    let msg = payload.message.as_deref().unwrap_or(&[]);

    let mut out = vec![0u8; msg_offset + WORD + padded_len(msg.len())];

    put_uint(&mut out, 0, payload.src_chain.0 as u128);
    put_uint(&mut out, 1, payload.dest_chain.0 as u128);
    put_uint(&mut out, 2, payload.amount);
    put_uint(&mut out, 3, payload.gas_limit.unwrap_or(0) as u128);
    put_uint(&mut out, 4, addr_offset as u128);
    put_uint(&mut out, 5, msg_offset as u128);

    let mut flags = 0u128;
    if payload.gas_limit.is_some() {
        flags |= FLAG_GAS_LIMIT as u128;
    }
    if payload.message.is_some() {
        flags |= FLAG_MESSAGE as u128;
    }
    put_uint(&mut out, 6, flags);

    put_tail(&mut out, addr_offset, &payload.dest_address);
    put_tail(&mut out, msg_offset, msg);

    Ok(out)
}

/// Decode the positional ABI-word event record, validating every declared
/// field width and tail offset before use.
pub fn decode_event_record(data: &[u8]) -> Result<CrossChainPayload, MemoError> {
    if data.len() < HEAD_WORDS * WORD {
        return Err(MemoError::Truncated {
            needed: HEAD_WORDS * WORD,
            have: data.len(),
        });
    }

    let src_chain = ChainId(word_as(data, 0, 4, "src_chain")? as u32);
    let dest_chain = ChainId(word_as(data, 1, 4, "dest_chain")? as u32);
    let amount = word_as(data, 2, 16, "amount")?;
    let gas_value = word_as(data, 3, 8, "gas_limit")? as u64;
    let addr_offset = word_as(data, 4, 8, "dest_address offset")? as usize;
    let msg_offset = word_as(data, 5, 8, "message offset")? as usize;
    let flags = word_as(data, 6, 1, "flags")? as u8;

    let dest_address = read_tail(data, addr_offset)?.to_vec();
    if dest_address.is_empty() {
        return Err(MemoError::FieldWidth {
            field: "dest_address",
            width: 0,
        });
    }
    let msg_bytes = read_tail(data, msg_offset)?;

    let gas_limit = if flags & FLAG_GAS_LIMIT != 0 {
        Some(gas_value)
    } else if gas_value != 0 {
        return Err(MemoError::Overflow("gas_limit"));
    } else {
        None
    };
    let message = if flags & FLAG_MESSAGE != 0 {
        Some(msg_bytes.to_vec())
    } else if !msg_bytes.is_empty() {
        return Err(MemoError::Overflow("message"));
    } else {
        None
    };

    Ok(CrossChainPayload {
        src_chain,
        dest_chain,
        dest_address,
        amount,
        message,
        gas_limit,
    })
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

fn put_uint(out: &mut [u8], word: usize, value: u128) {
    let end = (word + 1) * WORD;
    out[end - 16..end].copy_from_slice(&value.to_be_bytes());
}

fn put_tail(out: &mut [u8], offset: usize, bytes: &[u8]) {
    let end = offset + WORD;
    out[end - 8..end].copy_from_slice(&(bytes.len() as u64).to_be_bytes());
    out[end..end + bytes.len()].copy_from_slice(bytes);
}

/// Read head word `word` and validate it fits in `width` bytes.
fn word_as(data: &[u8], word: usize, width: usize, field: &'static str) -> Result<u128, MemoError> {
    let start = word * WORD;
    let bytes = &data[start..start + WORD];
    if bytes[..WORD - 16].iter().any(|&b| b != 0) {
        return Err(MemoError::Overflow(field));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&bytes[WORD - 16..]);
    let value = u128::from_be_bytes(buf);
    if width < 16 && value >> (width * 8) != 0 {
        return Err(MemoError::Overflow(field));
    }
    Ok(value)
}

/// Read a length-prefixed tail at `offset`, validating bounds and padding.
fn read_tail(data: &[u8], offset: usize) -> Result<&[u8], MemoError> {
    if offset % WORD != 0 || offset < HEAD_WORDS * WORD || offset + WORD > data.len() {
        return Err(MemoError::BadOffset(offset));
    }
    let len_word = &data[offset..offset + WORD];
    if len_word[..WORD - 8].iter().any(|&b| b != 0) {
        return Err(MemoError::BadOffset(offset));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&len_word[WORD - 8..]);
    let len = u64::from_be_bytes(buf) as usize;

    let start = offset + WORD;
    let end = start.checked_add(len).ok_or(MemoError::BadOffset(offset))?;
    if end > data.len() {
        return Err(MemoError::Truncated {
            needed: end,
            have: data.len(),
        });
    }
    Ok(&data[start..end])
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], MemoError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(MemoError::Truncated {
                needed: end,
                have: self.data.len(),
            });
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, MemoError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, MemoError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, MemoError> {
        let b = self.bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CrossChainPayload {
        CrossChainPayload {
            src_chain: ChainId(1),
            dest_chain: ChainId(5),
            dest_address: vec![0xab, 0xcd],
            amount: 100_000,
            message: None,
            gas_limit: Some(250_000),
        }
    }

    #[test]
    fn test_utxo_round_trip_minimal() {
        let p = payload();
        let encoded = encode_utxo_memo(&p).unwrap();
        assert!(encoded.len() <= DATA_CARRIER_LIMIT);
        assert_eq!(decode_utxo_memo(&encoded).unwrap(), p);
    }

    #[test]
    fn test_utxo_round_trip_all_fields() {
        let mut p = payload();
        p.dest_address = vec![0x11; 20];
        p.message = Some(b"hi".to_vec());
        let encoded = encode_utxo_memo(&p).unwrap();
        assert_eq!(decode_utxo_memo(&encoded).unwrap(), p);
    }

    #[test]
    fn test_utxo_empty_message_distinct_from_none() {
        let mut p = payload();
        p.message = Some(vec![]);
        let encoded = encode_utxo_memo(&p).unwrap();
        assert_eq!(decode_utxo_memo(&encoded).unwrap().message, Some(vec![]));
    }

    #[test]
    fn test_utxo_encode_rejects_oversize() {
        let mut p = payload();
        p.dest_address = vec![0x11; 40];
        p.message = Some(vec![0x22; 60]);
        assert!(matches!(
            encode_utxo_memo(&p),
            Err(MemoError::Oversize { .. })
        ));
    }

    #[test]
    fn test_utxo_encode_rejects_huge_amount() {
        let mut p = payload();
        p.amount = u128::from(u64::MAX) + 1;
        assert_eq!(encode_utxo_memo(&p), Err(MemoError::Overflow("amount")));
    }

    #[test]
    fn test_utxo_decode_rejects_truncation() {
        let encoded = encode_utxo_memo(&payload()).unwrap();
        for cut in 1..encoded.len() {
            assert!(
                decode_utxo_memo(&encoded[..cut]).is_err(),
                "truncation at {} must fail",
                cut
            );
        }
    }

    #[test]
    fn test_utxo_decode_rejects_trailing_bytes() {
        let mut encoded = encode_utxo_memo(&payload()).unwrap();
        encoded.push(0x00);
        assert!(matches!(
            decode_utxo_memo(&encoded),
            Err(MemoError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_utxo_decode_rejects_bad_version() {
        let mut encoded = encode_utxo_memo(&payload()).unwrap();
        encoded[0] = 0x02;
        assert_eq!(decode_utxo_memo(&encoded), Err(MemoError::Version(0x02)));
    }

    #[test]
    fn test_utxo_decode_donation() {
        assert_eq!(decode_utxo_memo(DONATION_MESSAGE), Err(MemoError::Donation));
    }

    #[test]
    fn test_extract_op_return_direct_push() {
        let mut script = vec![0x6a, 0x03];
        script.extend_from_slice(&[1, 2, 3]);
        assert_eq!(extract_op_return(&script), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_extract_op_return_pushdata1() {
        let data = vec![0xaa; 78];
        let mut script = vec![0x6a, 0x4c, 78];
        script.extend_from_slice(&data);
        assert_eq!(extract_op_return(&script), Some(&data[..]));
    }

    #[test]
    fn test_extract_op_return_rejects_non_op_return() {
        // P2PKH prefix
        assert_eq!(extract_op_return(&[0x76, 0xa9, 0x14]), None);
        // Declared push longer than the script
        assert_eq!(extract_op_return(&[0x6a, 0x05, 1, 2]), None);
    }

    #[test]
    fn test_event_round_trip_minimal() {
        let p = payload();
        let encoded = encode_event_record(&p).unwrap();
        assert_eq!(decode_event_record(&encoded).unwrap(), p);
    }

    #[test]
    fn test_event_round_trip_all_fields() {
        let p = CrossChainPayload {
            src_chain: ChainId(5),
            dest_chain: ChainId(1),
            dest_address: vec![0x42; 33],
            amount: u128::MAX,
            message: Some(vec![0x55; 100]),
            gas_limit: None,
        };
        let encoded = encode_event_record(&p).unwrap();
        assert_eq!(decode_event_record(&encoded).unwrap(), p);
    }

    #[test]
    fn test_event_decode_rejects_short_head() {
        assert!(matches!(
            decode_event_record(&[0u8; 100]),
            Err(MemoError::Truncated { .. })
        ));
    }

    #[test]
    fn test_event_decode_rejects_wide_chain_id() {
        let mut encoded = encode_event_record(&payload()).unwrap();
        // Set a byte above src_chain's declared 4-byte width
        encoded[27] = 0x01;
        assert_eq!(
            decode_event_record(&encoded),
            Err(MemoError::Overflow("src_chain"))
        );
    }

    #[test]
    fn test_event_decode_rejects_out_of_bounds_offset() {
        let mut encoded = encode_event_record(&payload()).unwrap();
        // Point the address tail past the end of the record
        let len = encoded.len();
        put_uint(&mut encoded, 4, (len + 64) as u128);
        assert!(matches!(
            decode_event_record(&encoded),
            Err(MemoError::BadOffset(_))
        ));
    }

    #[test]
    fn test_event_decode_rejects_gas_without_flag() {
        let mut p = payload();
        p.gas_limit = None;
        let mut encoded = encode_event_record(&p).unwrap();
        put_uint(&mut encoded, 3, 777);
        assert_eq!(
            decode_event_record(&encoded),
            Err(MemoError::Overflow("gas_limit"))
        );
    }
}

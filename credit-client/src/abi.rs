//! Solidity ABI codec
//!
//! Head/tail encoding of call arguments and decoding of return data for the
//! subset of types the certificate contract exposes: `uint<N>`, `int<N>`,
//! `address`, `bool`, `string`, `bytes`, `bytes<N>`, `T[]`, `T[k]` and tuples.
//! Integers are carried as 128-bit values; a decoded word that does not fit
//! is rejected rather than truncated.

use crate::types::Address;
use crate::{Error, Result};
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Four-byte function selector for a canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ABI parameter type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// Unsigned integer of the given bit width
    Uint(usize),
    /// Signed integer of the given bit width
    Int(usize),
    /// Address
    Address,
    /// Boolean
    Bool,
    /// UTF-8 string
    String,
    /// Dynamic byte array
    Bytes,
    /// Fixed byte array of the given length
    FixedBytes(usize),
    /// Dynamic array
    Array(Box<ParamType>),
    /// Fixed-length array
    FixedArray(Box<ParamType>, usize),
    /// Tuple (struct)
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// Parse a descriptor type string; `components` describe tuple members
    pub fn parse(kind: &str, components: &[ParamType]) -> Result<Self> {
        let kind = kind.trim();

        if let Some(inner) = kind.strip_suffix("[]") {
            return Ok(ParamType::Array(Box::new(Self::parse(inner, components)?)));
        }
        if kind.ends_with(']') {
            let open = kind
                .rfind('[')
                .ok_or_else(|| Error::Abi(format!("malformed array type '{}'", kind)))?;
            let size: usize = kind[open + 1..kind.len() - 1]
                .parse()
                .map_err(|_| Error::Abi(format!("malformed array length in '{}'", kind)))?;
            let inner = Self::parse(&kind[..open], components)?;
            return Ok(ParamType::FixedArray(Box::new(inner), size));
        }

        match kind {
            "address" => Ok(ParamType::Address),
            "bool" => Ok(ParamType::Bool),
            "string" => Ok(ParamType::String),
            "bytes" => Ok(ParamType::Bytes),
            "tuple" => Ok(ParamType::Tuple(components.to_vec())),
            _ => {
                if let Some(bits) = kind.strip_prefix("uint") {
                    Ok(ParamType::Uint(parse_bits(kind, bits)?))
                } else if let Some(bits) = kind.strip_prefix("int") {
                    Ok(ParamType::Int(parse_bits(kind, bits)?))
                } else if let Some(len) = kind.strip_prefix("bytes") {
                    match len.parse::<usize>() {
                        Ok(n) if (1..=32).contains(&n) => Ok(ParamType::FixedBytes(n)),
                        _ => Err(Error::Abi(format!("unsupported type '{}'", kind))),
                    }
                } else {
                    Err(Error::Abi(format!("unsupported type '{}'", kind)))
                }
            }
        }
    }

    /// Canonical form used in function signatures
    pub fn canonical(&self) -> String {
        match self {
            ParamType::Uint(bits) => format!("uint{}", bits),
            ParamType::Int(bits) => format!("int{}", bits),
            ParamType::Address => "address".to_string(),
            ParamType::Bool => "bool".to_string(),
            ParamType::String => "string".to_string(),
            ParamType::Bytes => "bytes".to_string(),
            ParamType::FixedBytes(n) => format!("bytes{}", n),
            ParamType::Array(inner) => format!("{}[]", inner.canonical()),
            ParamType::FixedArray(inner, n) => format!("{}[{}]", inner.canonical(), n),
            ParamType::Tuple(items) => format!(
                "({})",
                items
                    .iter()
                    .map(ParamType::canonical)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }

    /// Whether values of this type live in the tail section
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::String | ParamType::Bytes | ParamType::Array(_) => true,
            ParamType::FixedArray(inner, _) => inner.is_dynamic(),
            ParamType::Tuple(items) => items.iter().any(ParamType::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return WORD;
        }
        match self {
            ParamType::FixedArray(inner, n) => inner.head_size() * n,
            ParamType::Tuple(items) => items.iter().map(ParamType::head_size).sum(),
            _ => WORD,
        }
    }

    /// Whether `token` is a value of this type
    pub fn matches(&self, token: &Token) -> bool {
        match (self, token) {
            (ParamType::Uint(bits), Token::Uint(v)) => *bits >= 128 || *v >> *bits == 0,
            (ParamType::Int(_), Token::Int(_)) => true,
            (ParamType::Address, Token::Address(_)) => true,
            (ParamType::Bool, Token::Bool(_)) => true,
            (ParamType::String, Token::String(_)) => true,
            (ParamType::Bytes, Token::Bytes(_)) => true,
            (ParamType::FixedBytes(n), Token::FixedBytes(b)) => b.len() == *n,
            (ParamType::Array(inner), Token::Array(items)) => {
                items.iter().all(|item| inner.matches(item))
            }
            (ParamType::FixedArray(inner, n), Token::FixedArray(items)) => {
                items.len() == *n && items.iter().all(|item| inner.matches(item))
            }
            (ParamType::Tuple(types), Token::Tuple(items)) => {
                types.len() == items.len()
                    && types.iter().zip(items).all(|(ty, item)| ty.matches(item))
            }
            _ => false,
        }
    }
}

fn parse_bits(kind: &str, bits: &str) -> Result<usize> {
    if bits.is_empty() {
        return Ok(256);
    }
    match bits.parse::<usize>() {
        Ok(n) if n % 8 == 0 && (8..=256).contains(&n) => Ok(n),
        _ => Err(Error::Abi(format!("unsupported type '{}'", kind))),
    }
}

/// ABI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Unsigned integer
    Uint(u128),
    /// Signed integer
    Int(i128),
    /// Address
    Address(Address),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    String(String),
    /// Dynamic byte array
    Bytes(Vec<u8>),
    /// Fixed byte array
    FixedBytes(Vec<u8>),
    /// Dynamic array
    Array(Vec<Token>),
    /// Fixed-length array
    FixedArray(Vec<Token>),
    /// Tuple
    Tuple(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        match self {
            Token::String(_) | Token::Bytes(_) | Token::Array(_) => true,
            Token::FixedArray(items) | Token::Tuple(items) => items.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return WORD;
        }
        match self {
            Token::FixedArray(items) | Token::Tuple(items) => {
                items.iter().map(Token::head_size).sum()
            }
            _ => WORD,
        }
    }

    pub fn into_uint(self) -> Option<u128> {
        match self {
            Token::Uint(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_address(self) -> Option<Address> {
        match self {
            Token::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Token::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_fixed_bytes(self) -> Option<Vec<u8>> {
        match self {
            Token::FixedBytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Token>> {
        match self {
            Token::Array(items) | Token::FixedArray(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_tuple(self) -> Option<Vec<Token>> {
        match self {
            Token::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

/// Encode a parameter list
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let heads_len: usize = tokens.iter().map(Token::head_size).sum();
    let mut head = Vec::with_capacity(heads_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(heads_len + tail.len()));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }

    head.extend(tail);
    head
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Uint(v) => uint_word(*v).to_vec(),
        Token::Int(v) => {
            let mut word = if *v < 0 { [0xffu8; WORD] } else { [0u8; WORD] };
            word[16..].copy_from_slice(&v.to_be_bytes());
            word.to_vec()
        }
        Token::Address(address) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(address.as_bytes());
            word.to_vec()
        }
        Token::Bool(b) => uint_word(u128::from(*b)).to_vec(),
        Token::FixedBytes(bytes) => {
            let mut word = [0u8; WORD];
            let len = bytes.len().min(WORD);
            word[..len].copy_from_slice(&bytes[..len]);
            word.to_vec()
        }
        Token::Bytes(bytes) => encode_packed_bytes(bytes),
        Token::String(s) => encode_packed_bytes(s.as_bytes()),
        Token::Array(items) => {
            let mut out = usize_word(items.len()).to_vec();
            out.extend(encode(items));
            out
        }
        Token::FixedArray(items) | Token::Tuple(items) => encode(items),
    }
}

fn encode_packed_bytes(bytes: &[u8]) -> Vec<u8> {
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded);
    out.extend_from_slice(&usize_word(bytes.len()));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

fn uint_word(v: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&v.to_be_bytes());
    word
}

fn usize_word(v: usize) -> [u8; WORD] {
    uint_word(v as u128)
}

/// Decode return data against a parameter list
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    decode_params(types, data, 0)
}

fn decode_params(types: &[ParamType], data: &[u8], base: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity(types.len());
    let mut offset = base;

    for ty in types {
        if ty.is_dynamic() {
            let pointer = read_usize(data, offset)?;
            let at = base
                .checked_add(pointer)
                .ok_or_else(|| Error::Abi("offset overflow".to_string()))?;
            tokens.push(decode_token(ty, data, at)?);
            offset += WORD;
        } else {
            tokens.push(decode_token(ty, data, offset)?);
            offset += ty.head_size();
        }
    }

    Ok(tokens)
}

fn decode_token(ty: &ParamType, data: &[u8], at: usize) -> Result<Token> {
    match ty {
        ParamType::Uint(_) => {
            let word = read_word(data, at)?;
            if word[..16].iter().any(|b| *b != 0) {
                return Err(Error::Abi(format!(
                    "integer at offset {} exceeds 128 bits",
                    at
                )));
            }
            Ok(Token::Uint(u128::from_be_bytes(low_half(word))))
        }
        ParamType::Int(_) => {
            let word = read_word(data, at)?;
            let value = i128::from_be_bytes(low_half(word));
            let fill = if value < 0 { 0xff } else { 0x00 };
            if word[..16].iter().any(|b| *b != fill) {
                return Err(Error::Abi(format!(
                    "integer at offset {} exceeds 128 bits",
                    at
                )));
            }
            Ok(Token::Int(value))
        }
        ParamType::Address => {
            let word = read_word(data, at)?;
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&word[12..]);
            Ok(Token::Address(Address::from_bytes(bytes)))
        }
        ParamType::Bool => {
            let word = read_word(data, at)?;
            if word[..31].iter().any(|b| *b != 0) || word[31] > 1 {
                return Err(Error::Abi(format!("invalid bool at offset {}", at)));
            }
            Ok(Token::Bool(word[31] == 1))
        }
        ParamType::FixedBytes(n) => {
            let word = read_word(data, at)?;
            Ok(Token::FixedBytes(word[..*n].to_vec()))
        }
        ParamType::Bytes => Ok(Token::Bytes(read_packed_bytes(data, at)?)),
        ParamType::String => {
            let bytes = read_packed_bytes(data, at)?;
            String::from_utf8(bytes)
                .map(Token::String)
                .map_err(|e| Error::Abi(format!("invalid UTF-8 string: {}", e)))
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, at)?;
            let available = data.len().saturating_sub(at + WORD) / WORD;
            if len > available {
                return Err(Error::Abi(format!(
                    "array length {} exceeds available data",
                    len
                )));
            }
            let types = vec![(**inner).clone(); len];
            Ok(Token::Array(decode_params(&types, data, at + WORD)?))
        }
        ParamType::FixedArray(inner, n) => {
            let types = vec![(**inner).clone(); *n];
            Ok(Token::FixedArray(decode_params(&types, data, at)?))
        }
        ParamType::Tuple(items) => Ok(Token::Tuple(decode_params(items, data, at)?)),
    }
}

fn low_half(word: &[u8; WORD]) -> [u8; 16] {
    let mut half = [0u8; 16];
    half.copy_from_slice(&word[16..]);
    half
}

fn read_word(data: &[u8], at: usize) -> Result<&[u8; WORD]> {
    let end = at
        .checked_add(WORD)
        .ok_or_else(|| Error::Abi("offset overflow".to_string()))?;
    data.get(at..end)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            Error::Abi(format!(
                "return data too short: need {} bytes, have {}",
                end,
                data.len()
            ))
        })
}

fn read_usize(data: &[u8], at: usize) -> Result<usize> {
    let word = read_word(data, at)?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(Error::Abi(format!("length or offset at {} out of range", at)));
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(low))
        .map_err(|_| Error::Abi(format!("length or offset at {} out of range", at)))
}

fn read_packed_bytes(data: &[u8], at: usize) -> Result<Vec<u8>> {
    let len = read_usize(data, at)?;
    let start = at + WORD;
    data.get(start..start.saturating_add(len))
        .map(<[u8]>::to_vec)
        .ok_or_else(|| Error::Abi(format!("byte string of length {} truncated", len)))
}

/// Extract a human-readable reason from revert data.
///
/// Understands `Error(string)` and `Panic(uint256)` payloads.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (sig, body) = data.split_at(4);

    if sig == selector("Error(string)") {
        let reason = decode(&[ParamType::String], body)
            .ok()?
            .into_iter()
            .next()?
            .into_string()?;
        return Some(reason);
    }

    if sig == selector("Panic(uint256)") {
        let code = decode(&[ParamType::Uint(256)], body)
            .ok()?
            .into_iter()
            .next()?
            .into_uint()?;
        let meaning = match code {
            0x01 => "assertion failed",
            0x11 => "arithmetic overflow or underflow",
            0x12 => "division by zero",
            0x21 => "invalid enum value",
            0x32 => "array index out of bounds",
            0x41 => "out of memory",
            _ => "panic",
        };
        return Some(format!("{} (panic code 0x{:02x})", meaning, code));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(v: u128) -> Vec<u8> {
        uint_word(v).to_vec()
    }

    #[test]
    fn test_well_known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("Error(string)"), [0x08, 0xc3, 0x79, 0xa0]);
        assert_eq!(selector("Panic(uint256)"), [0x4e, 0x48, 0x7b, 0x71]);
    }

    #[test]
    fn test_keccak_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_encode_string_and_uint_layout() {
        let encoded = encode(&[Token::String("ipfs://abc".to_string()), Token::Uint(5)]);

        let mut expected = word(0x40);
        expected.extend(word(5));
        expected.extend(word(10));
        let mut text = b"ipfs://abc".to_vec();
        text.resize(32, 0);
        expected.extend(text);

        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_decode_tuple_with_dynamic_members() {
        let types = vec![
            ParamType::Address,
            ParamType::String,
            ParamType::Uint(256),
            ParamType::Bool,
        ];
        let submitter: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        let tokens = vec![
            Token::Address(submitter),
            Token::String("ipfs://report".to_string()),
            Token::Uint(42),
            Token::Bool(true),
        ];

        let decoded = decode(&types, &encode(&tokens)).unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn test_decode_array_of_structs() {
        let record = ParamType::Tuple(vec![ParamType::Uint(256), ParamType::String]);
        let types = vec![ParamType::Array(Box::new(record))];
        let tokens = vec![Token::Array(vec![
            Token::Tuple(vec![Token::Uint(1), Token::String("a".into())]),
            Token::Tuple(vec![Token::Uint(2), Token::String("bb".into())]),
        ])];

        assert_eq!(decode(&types, &encode(&tokens)).unwrap(), tokens);
    }

    #[test]
    fn test_negative_int_is_sign_extended() {
        let encoded = encode(&[Token::Int(-1)]);
        assert_eq!(encoded, vec![0xff; 32]);
        assert_eq!(
            decode(&[ParamType::Int(256)], &encoded).unwrap(),
            vec![Token::Int(-1)]
        );
    }

    #[test]
    fn test_decode_rejects_wide_integers_and_short_data() {
        let mut wide = vec![0u8; 32];
        wide[0] = 1;
        assert!(decode(&[ParamType::Uint(256)], &wide).is_err());
        assert!(decode(&[ParamType::Uint(256)], &[0u8; 31]).is_err());

        // array claiming more elements than the payload holds
        let mut bogus = word(0x20);
        bogus.extend(word(1_000_000));
        assert!(decode(&[ParamType::Array(Box::new(ParamType::Uint(256)))], &bogus).is_err());
    }

    #[test]
    fn test_parse_type_strings() {
        assert_eq!(ParamType::parse("uint", &[]).unwrap(), ParamType::Uint(256));
        assert_eq!(ParamType::parse("bytes32", &[]).unwrap(), ParamType::FixedBytes(32));
        assert_eq!(
            ParamType::parse("uint256[3][]", &[]).unwrap().canonical(),
            "uint256[3][]"
        );
        assert_eq!(
            ParamType::parse("tuple[]", &[ParamType::Address, ParamType::Bool])
                .unwrap()
                .canonical(),
            "(address,bool)[]"
        );
        assert!(ParamType::parse("fixed128x18", &[]).is_err());
        assert!(ParamType::parse("uint7", &[]).is_err());
    }

    #[test]
    fn test_type_matching() {
        assert!(ParamType::Uint(8).matches(&Token::Uint(255)));
        assert!(!ParamType::Uint(8).matches(&Token::Uint(256)));
        assert!(!ParamType::Bool.matches(&Token::Uint(1)));
        assert!(ParamType::FixedBytes(32).matches(&Token::FixedBytes(vec![0; 32])));
    }

    #[test]
    fn test_revert_reasons() {
        let mut data = selector("Error(string)").to_vec();
        data.extend(encode(&[Token::String("Caller is not a certifier".into())]));
        assert_eq!(
            decode_revert_reason(&data).as_deref(),
            Some("Caller is not a certifier")
        );

        let mut panic = selector("Panic(uint256)").to_vec();
        panic.extend(word(0x11));
        assert_eq!(
            decode_revert_reason(&panic).as_deref(),
            Some("arithmetic overflow or underflow (panic code 0x11)")
        );

        assert_eq!(decode_revert_reason(&[0xde, 0xad]), None);
    }
}

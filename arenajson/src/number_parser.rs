// SPDX-License-Identifier: Apache-2.0

use crate::parse_error::ParseError;
use crate::shared::Span;
use crate::tokenizer::{Literal, Token, TokenKind};

/// Bytes a number token may span before validation.
fn is_number_byte(byte: u8) -> bool {
    byte.is_ascii_digit() || matches!(byte, b'+' | b'-' | b'.' | b'e' | b'E')
}

/// Scan the number starting at `start` and decode its value.
///
/// The span covers the longest run of number bytes; whether that run is
/// acceptable depends on the `strict-numbers` / `lenient-numbers` feature.
pub(crate) fn scan_number(source: &[u8], start: usize) -> Result<Token, ParseError> {
    let rest = source.get(start..).unwrap_or_default();
    let len = rest.iter().take_while(|&&b| is_number_byte(b)).count();
    let span = Span::new(start, len);
    let value = decode_number(&rest[..len], span)?;
    Ok(Token::new(TokenKind::Number, span, Literal::Number(value)))
}

fn decode_number(bytes: &[u8], span: Span) -> Result<f64, ParseError> {
    #[cfg(feature = "strict-numbers")]
    {
        if !is_json_number(bytes) {
            return Err(ParseError::MalformedNumber(span));
        }
    }
    // Number bytes are all ASCII
    let text = core::str::from_utf8(bytes).map_err(|_| ParseError::MalformedNumber(span))?;
    let value: f64 = text
        .parse()
        .map_err(|_| ParseError::MalformedNumber(span))?;
    if !value.is_finite() {
        return Err(ParseError::NumericOverflow(span));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Start,
    Sign,
    LeadingZero,
    BeforeDecimalPoint,
    Decimal,
    AfterDecimalPoint,
    Exponent,
    ExponentSign,
    AfterExponent,
}

/// RFC 8259 number grammar:
/// `-? (0 | [1-9][0-9]*) (\.[0-9]+)? ([eE][+-]?[0-9]+)?`
#[cfg_attr(not(feature = "strict-numbers"), allow(dead_code))]
fn is_json_number(bytes: &[u8]) -> bool {
    let mut state = Num::Start;
    for &byte in bytes {
        state = match (state, byte) {
            (Num::Start, b'-') => Num::Sign,
            (Num::Start | Num::Sign, b'0') => Num::LeadingZero,
            (Num::Start | Num::Sign, b'1'..=b'9') => Num::BeforeDecimalPoint,
            (Num::BeforeDecimalPoint, b'0'..=b'9') => Num::BeforeDecimalPoint,
            (Num::LeadingZero | Num::BeforeDecimalPoint, b'.') => Num::Decimal,
            (Num::Decimal | Num::AfterDecimalPoint, b'0'..=b'9') => Num::AfterDecimalPoint,
            (
                Num::LeadingZero | Num::BeforeDecimalPoint | Num::AfterDecimalPoint,
                b'e' | b'E',
            ) => Num::Exponent,
            (Num::Exponent, b'+' | b'-') => Num::ExponentSign,
            (Num::Exponent | Num::ExponentSign | Num::AfterExponent, b'0'..=b'9') => {
                Num::AfterExponent
            }
            _ => return false,
        };
    }
    matches!(
        state,
        Num::LeadingZero | Num::BeforeDecimalPoint | Num::AfterDecimalPoint | Num::AfterExponent
    )
}

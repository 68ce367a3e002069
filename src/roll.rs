//! Roll number specifications: `103683, 124861` or `100001-100005`, mixed freely.

use crate::error::{Result, ScrapeError};

/// Upper bound on the roll numbers one specification may denote.
pub const MAX_ROLLS: usize = 1_000_000;

/// Expand a roll specification into concrete roll numbers, left to right.
///
/// Ranges are inclusive and ascending; a range whose start exceeds its end
/// contributes nothing. Duplicates are kept.
pub fn expand(spec: &str) -> Result<Vec<u64>> {
    let tokens = parse(spec)?;
    let mut rolls = Vec::with_capacity(cardinality(&tokens)?);
    for token in tokens {
        match token {
            Token::Literal(roll) => rolls.push(roll),
            Token::Range(start, end) => rolls.extend(start..=end),
        }
    }
    Ok(rolls)
}

/// Check a specification without materializing it.
pub fn validate(spec: &str) -> Result<usize> {
    cardinality(&parse(spec)?)
}

/// Join roll numbers back into a specification that [`expand`] accepts.
pub fn to_spec(rolls: &[u64]) -> String {
    rolls
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

enum Token {
    Literal(u64),
    Range(u64, u64),
}

fn parse(spec: &str) -> Result<Vec<Token>> {
    spec.split(',')
        .map(str::trim)
        .map(|token| {
            if token.contains('-') {
                let (start, end) = parse_range(token)?;
                Ok(Token::Range(start, end))
            } else {
                parse_literal(token).map(Token::Literal)
            }
        })
        .collect()
}

// Summed as u128: a single range may span all of u64.
fn cardinality(tokens: &[Token]) -> Result<usize> {
    let count: u128 = tokens
        .iter()
        .map(|token| match *token {
            Token::Literal(_) => 1,
            Token::Range(start, end) if start <= end => u128::from(end - start) + 1,
            Token::Range(..) => 0,
        })
        .sum();
    if count > MAX_ROLLS as u128 {
        return Err(ScrapeError::TooManyRolls {
            count,
            limit: MAX_ROLLS,
        });
    }
    Ok(count as usize)
}

fn parse_range(token: &str) -> Result<(u64, u64)> {
    let malformed = || ScrapeError::MalformedRange {
        token: token.to_string(),
    };
    let parts: Vec<&str> = token.split('-').map(str::trim).collect();
    let [start, end] = parts.as_slice() else {
        return Err(malformed());
    };
    let start = parse_digits(start).ok_or_else(malformed)?;
    let end = parse_digits(end).ok_or_else(malformed)?;
    Ok((start, end))
}

fn parse_literal(token: &str) -> Result<u64> {
    parse_digits(token).ok_or_else(|| ScrapeError::MalformedToken {
        token: token.to_string(),
    })
}

// `u64::from_str` accepts a leading '+', which the grammar does not.
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

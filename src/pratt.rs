//! Binding-power table for Datascript expression precedence.
//!
//! The parser's expression function is a single precedence-climbing loop
//! that consults this table rather than one hand-written function per
//! precedence level.
//!
//! # Precedence table
//!
//! From lowest to highest, matching SPEC_FULL.md §4.2:
//! 1. Assignment `=` — right associative
//! 2. DSL layer (`<- ! !! ? ?? |>`) — left associative, handled by the
//!    parser's dedicated DSL-expression function (not ordinary infix climbing,
//!    since the right-hand side parses at a different precedence than a plain
//!    binary operator)
//! 3. Logical or `||`
//! 4. Logical and `&&`
//! 5. Equality `==`, `!=`
//! 6. Relational `<`, `<=`, `>`, `>=`
//! 7. Additive `+`, `-`
//! 8. Multiplicative `*`, `/`, `%`
//! 9. Unary `!`, `-`, `await`
//! 10. Call / member `()`, `.`, `[]`

use crate::lexer::TokenKind;

/// Returns the (left, right) binding power for an infix operator token, or
/// `None` if the token is not an infix operator at this layer.
///
/// `left < right` means right-associative, `left > right` means
/// left-associative.
pub fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
    Some(match kind {
        TokenKind::OrOr => (10, 11),
        TokenKind::AndAnd => (20, 21),
        TokenKind::EqEq | TokenKind::NotEq => (30, 31),
        TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => (40, 41),
        TokenKind::Plus | TokenKind::Minus => (50, 51),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (60, 61),
        _ => return None,
    })
}

/// Returns the binding power of a prefix (unary) operator token.
pub fn prefix_binding_power(kind: TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Bang | TokenKind::Minus | TokenKind::Await => Some(70),
        _ => None,
    }
}

/// Binding power of the call/member layer (`()`, `.`, `[]`), the tightest.
pub const CALL_BINDING_POWER: u8 = 80;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_binds_loosest_of_the_logical_operators() {
        let (or_l, _) = infix_binding_power(TokenKind::OrOr).unwrap();
        let (and_l, _) = infix_binding_power(TokenKind::AndAnd).unwrap();
        assert!(or_l < and_l);
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let (_, add_r) = infix_binding_power(TokenKind::Plus).unwrap();
        let (mul_l, _) = infix_binding_power(TokenKind::Star).unwrap();
        assert!(mul_l > add_r);
    }

    #[test]
    fn non_operator_token_has_no_binding_power() {
        assert_eq!(infix_binding_power(TokenKind::LParen), None);
    }
}

use crate::error::XPathError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Literal(String),
    Name(String),
    Variable(String),
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Star,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Pipe,
    Plus,
    Minus,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    DoubleColon,
}

fn is_name_start(character: char) -> bool {
    character.is_alphabetic() || character == '_'
}

fn is_name_char(character: char) -> bool {
    character.is_alphanumeric() || matches!(character, '_' | '-' | '.')
}

pub fn tokenize(expression: &str) -> Result<Vec<Token>, XPathError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;
    while let Some(&character) = chars.get(index) {
        let next = chars.get(index + 1).copied();
        match character {
            ' ' | '\t' | '\n' | '\r' => index += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                index += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                index += 1;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                index += 2;
            }
            '.' if !next.is_some_and(|digit| digit.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                index += 1;
            }
            '@' => {
                tokens.push(Token::At);
                index += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                index += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                index += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                index += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                index += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                index += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                index += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                index += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                index += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                index += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                index += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::NotEq);
                index += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::LtEq);
                index += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                index += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::GtEq);
                index += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                index += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::DoubleColon);
                index += 2;
            }
            '"' | '\'' => {
                let end = chars[index + 1..]
                    .iter()
                    .position(|candidate| *candidate == character)
                    .ok_or_else(|| XPathError::static_error(expression, "unterminated string literal"))?;
                tokens.push(Token::Literal(chars[index + 1..index + 1 + end].iter().collect()));
                index += end + 2;
            }
            '$' => {
                let start = index + 1;
                let mut end = start;
                while chars.get(end).is_some_and(|candidate| is_name_char(*candidate) || *candidate == ':') {
                    end += 1;
                }
                if end == start {
                    return Err(XPathError::static_error(expression, "missing variable name"));
                }
                tokens.push(Token::Variable(chars[start..end].iter().collect()));
                index = end;
            }
            digit if digit.is_ascii_digit() || digit == '.' => {
                let start = index;
                while chars
                    .get(index)
                    .is_some_and(|candidate| candidate.is_ascii_digit() || *candidate == '.')
                {
                    index += 1;
                }
                let text: String = chars[start..index].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| XPathError::static_error(expression, format!("invalid number `{text}`")))?;
                tokens.push(Token::Number(number));
            }
            start if is_name_start(start) => {
                let begin = index;
                while chars.get(index).copied().is_some_and(is_name_char) {
                    index += 1;
                }
                // Prefixed name such as `xs:integer`, but not an axis `child::`.
                if chars.get(index) == Some(&':')
                    && chars.get(index + 1).copied().is_some_and(is_name_start)
                {
                    index += 1;
                    while chars.get(index).copied().is_some_and(is_name_char) {
                        index += 1;
                    }
                }
                tokens.push(Token::Name(chars[begin..index].iter().collect()));
            }
            other => {
                return Err(XPathError::static_error(expression, format!("unexpected character `{other}`")));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if tokens are split incorrectly.
    #[test]
    fn tokenizes_paths_and_operators() {
        let tokens = tokenize("../item[@id != 'x']/xs:value >= 2.5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::DotDot,
                Token::Slash,
                Token::Name("item".into()),
                Token::LBracket,
                Token::At,
                Token::Name("id".into()),
                Token::NotEq,
                Token::Literal("x".into()),
                Token::RBracket,
                Token::Slash,
                Token::Name("xs:value".into()),
                Token::GtEq,
                Token::Number(2.5),
            ]
        );
    }

    /// # Panics
    /// Panics if axes are read as prefixed names.
    #[test]
    fn axis_separator_is_not_a_prefix() {
        let tokens = tokenize("child::a").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Name("child".into()), Token::DoubleColon, Token::Name("a".into())]
        );
    }

    /// # Panics
    /// Panics if unterminated literals are accepted.
    #[test]
    fn unterminated_literal_is_static_error() {
        let error = tokenize("'abc").unwrap_err();
        assert!(!error.is_dynamic());
    }
}

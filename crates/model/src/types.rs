//! Built-in datatype checks for the `type` model item property.

/// Primitive type a value is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
}

/// A datatype named by a `type` attribute.
///
/// `xs:` types reject the empty string for required nodes; their `xforms:`
/// counterparts always accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataType {
    pub primitive: Primitive,
    pub allows_empty: bool,
}

impl DataType {
    /// Resolve a qualified type name. Unknown names yield `None`.
    pub fn from_qname(qname: &str) -> Option<Self> {
        let (prefix, local) = qname.split_once(':')?;
        let allows_empty = match prefix {
            "xs" | "xsd" => false,
            "xforms" | "xf" => true,
            _ => return None,
        };
        let primitive = match local {
            "string" => Primitive::String,
            "integer" | "int" | "long" => Primitive::Integer,
            "decimal" | "double" | "float" => Primitive::Decimal,
            "boolean" => Primitive::Boolean,
            "date" => Primitive::Date,
            _ => return None,
        };
        Some(Self { primitive, allows_empty })
    }

    /// Whether the default `xs:string` / `xforms:string` type is named.
    pub fn is_default_string(qname: &str) -> bool {
        matches!(qname, "xs:string" | "xforms:string")
    }

    /// Check a node value. Empty values of nodes that are not required are
    /// never checked.
    pub fn accepts(self, value: &str, required: bool) -> bool {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return self.allows_empty || !required || self.primitive == Primitive::String;
        }
        match self.primitive {
            Primitive::String => true,
            Primitive::Integer => is_integer(trimmed),
            Primitive::Decimal => is_decimal(trimmed),
            Primitive::Boolean => matches!(trimmed, "true" | "false" | "1" | "0"),
            Primitive::Date => is_date(trimmed),
        }
    }
}

fn strip_sign(text: &str) -> &str {
    text.strip_prefix(['+', '-']).unwrap_or(text)
}

fn is_integer(text: &str) -> bool {
    let digits = strip_sign(text);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

fn is_decimal(text: &str) -> bool {
    let digits = strip_sign(text);
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    !(whole.is_empty() && fraction.is_empty())
        && whole.bytes().all(|byte| byte.is_ascii_digit())
        && fraction.bytes().all(|byte| byte.is_ascii_digit())
}

/// `YYYY-MM-DD` with an optional `Z` or `±hh:mm` zone.
fn is_date(text: &str) -> bool {
    let date = text
        .strip_suffix('Z')
        .or_else(|| {
            let split = text.len().checked_sub(6)?;
            let zone = text.get(split..)?;
            let valid_zone = zone.starts_with(['+', '-'])
                && zone.as_bytes().get(3) == Some(&b':')
                && zone.bytes().enumerate().all(|(index, byte)| matches!(index, 0 | 3) || byte.is_ascii_digit());
            valid_zone.then(|| &text[..split])
        })
        .unwrap_or(text);
    let mut parts = date.splitn(3, '-');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if year.len() < 4 || !is_integer(year) || month.len() != 2 || day.len() != 2 {
        return false;
    }
    let (Ok(year), Ok(month), Ok(day)) = (year.parse::<i64>(), month.parse::<u32>(), day.parse::<u32>()) else {
        return false;
    };
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    let days_in_month = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => return false,
    };
    (1..=days_in_month).contains(&day)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if the `xforms:` types reject the empty string.
    #[test]
    fn xforms_types_accept_empty() {
        let xs = DataType::from_qname("xs:integer").unwrap();
        let xforms = DataType::from_qname("xforms:integer").unwrap();
        assert!(!xs.accepts("", true));
        assert!(xs.accepts("", false));
        assert!(xforms.accepts("", true));
        assert!(xs.accepts(" 42 ", true));
        assert!(!xs.accepts("4.2", true));
    }

    /// # Panics
    /// Panics if dates are checked incorrectly.
    #[test]
    fn dates_respect_calendar() {
        let date = DataType::from_qname("xs:date").unwrap();
        assert!(date.accepts("2024-02-29", true));
        assert!(!date.accepts("2023-02-29", true));
        assert!(date.accepts("2023-12-31Z", true));
        assert!(date.accepts("2023-12-31+02:00", true));
        assert!(!date.accepts("2023-13-01", true));
        assert!(!date.accepts("tomorrow", true));
    }

    /// # Panics
    /// Panics if unknown prefixes resolve.
    #[test]
    fn unknown_types_do_not_resolve() {
        assert_eq!(DataType::from_qname("foo:integer"), None);
        assert_eq!(DataType::from_qname("xs:gYearMonth"), None);
        assert!(DataType::from_qname("xs:decimal").unwrap().accepts("-.5", true));
    }
}

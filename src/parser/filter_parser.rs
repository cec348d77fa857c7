use crate::error::{ScimError, ScimResult};

use super::filter_operator::{AttrPath, CompareOp, FilterOp, FilterValue};

/// Parse a SCIM 1.0 filter expression.
///
/// ```text
/// filter    := term (' or ' term)*
/// term      := factor (' and ' factor)*
/// factor    := '(' filter ')' | predicate
/// predicate := attrPath op value | attrPath ' pr'
/// ```
///
/// Operators are case-insensitive; string literals are double-quoted with
/// `\"` and `\\` escapes.
pub fn parse_filter(input: &str) -> ScimResult<FilterOp> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let filter = parser.filter()?;
    if parser.pos != parser.tokens.len() {
        return Err(ScimError::InvalidFilter(format!(
            "trailing input after expression: {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(filter)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Word(String),
    Str(String),
}

fn tokenize(input: &str) -> ScimResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('"') => literal.push('"'),
                            Some('\\') => literal.push('\\'),
                            Some(other) => {
                                return Err(ScimError::InvalidFilter(format!(
                                    "unsupported escape '\\{}'",
                                    other
                                )))
                            }
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => literal.push(other),
                    }
                }
                if !closed {
                    return Err(ScimError::InvalidFilter(
                        "unterminated string literal".to_string(),
                    ));
                }
                tokens.push(Token::Str(literal));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ' ' || c == '\t' || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn filter(&mut self) -> ScimResult<FilterOp> {
        let mut left = self.term()?;
        while self.peek_keyword("or") {
            self.next();
            let right = self.term()?;
            left = FilterOp::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> ScimResult<FilterOp> {
        let mut left = self.factor()?;
        while self.peek_keyword("and") {
            self.next();
            let right = self.factor()?;
            left = FilterOp::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> ScimResult<FilterOp> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.filter()?;
            if self.next() != Some(Token::RParen) {
                return Err(ScimError::InvalidFilter(
                    "expected closing parenthesis".to_string(),
                ));
            }
            return Ok(inner);
        }
        self.predicate()
    }

    fn predicate(&mut self) -> ScimResult<FilterOp> {
        let path = match self.next() {
            Some(Token::Word(w)) => AttrPath::parse(&w),
            other => {
                return Err(ScimError::InvalidFilter(format!(
                    "expected attribute path, found {:?}",
                    other
                )))
            }
        };

        let op_token = match self.next() {
            Some(Token::Word(w)) => w,
            other => {
                return Err(ScimError::InvalidFilter(format!(
                    "expected operator after '{}', found {:?}",
                    path, other
                )))
            }
        };

        if op_token.eq_ignore_ascii_case("pr") {
            return Ok(FilterOp::Present(path));
        }

        let op = CompareOp::parse(&op_token).ok_or_else(|| {
            ScimError::InvalidFilter(format!("unknown operator '{}'", op_token))
        })?;

        let value = match self.next() {
            Some(Token::Str(s)) => FilterValue::Str(s),
            Some(Token::Word(w)) => {
                if w.eq_ignore_ascii_case("true") {
                    FilterValue::Bool(true)
                } else if w.eq_ignore_ascii_case("false") {
                    FilterValue::Bool(false)
                } else {
                    w.parse::<i64>().map(FilterValue::Num).map_err(|_| {
                        ScimError::InvalidFilter(format!("invalid literal '{}'", w))
                    })?
                }
            }
            other => {
                return Err(ScimError::InvalidFilter(format!(
                    "expected comparison value, found {:?}",
                    other
                )))
            }
        };

        Ok(FilterOp::Compare(path, op, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScimAttribute, ScimObject, ScimValue};
    use crate::schema::core;

    fn user(user_name: &str, active: bool) -> ScimObject {
        let mut object = ScimObject::new("User");
        object.add_attribute(
            ScimAttribute::singular(
                core::USER.attribute("userName").unwrap(),
                ScimValue::Str(user_name.to_string()),
            )
            .unwrap(),
        );
        object.add_attribute(
            ScimAttribute::singular(
                core::USER.attribute("active").unwrap(),
                ScimValue::Bool(active),
            )
            .unwrap(),
        );
        object
    }

    #[test]
    fn test_parse_equality() {
        let filter = parse_filter("userName eq \"alice\"").unwrap();
        assert_eq!(
            filter,
            FilterOp::Compare(
                AttrPath::parse("userName"),
                CompareOp::Eq,
                FilterValue::Str("alice".to_string())
            )
        );
    }

    #[test]
    fn test_parse_present_and_booleans() {
        let filter = parse_filter("title PR and active EQ true").unwrap();
        match filter {
            FilterOp::And(left, right) => {
                assert_eq!(*left, FilterOp::Present(AttrPath::parse("title")));
                assert_eq!(
                    *right,
                    FilterOp::Compare(
                        AttrPath::parse("active"),
                        CompareOp::Eq,
                        FilterValue::Bool(true)
                    )
                );
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_grouping_precedence() {
        // or binds looser than and; parens override
        let filter =
            parse_filter("(userName sw \"a\" or userName sw \"b\") and active eq true").unwrap();
        assert!(matches!(filter, FilterOp::And(_, _)));

        let filter = parse_filter("userName sw \"a\" or userName sw \"b\" and active eq true")
            .unwrap();
        assert!(matches!(filter, FilterOp::Or(_, _)));
    }

    #[test]
    fn test_parse_escaped_string() {
        let filter = parse_filter(r#"displayName eq "say \"hi\" \\ now""#).unwrap();
        assert_eq!(
            filter,
            FilterOp::Compare(
                AttrPath::parse("displayName"),
                CompareOp::Eq,
                FilterValue::Str(r#"say "hi" \ now"#.to_string())
            )
        );
    }

    #[test]
    fn test_parse_sub_attribute_path() {
        let filter = parse_filter("name.familyName co \"Doe\"").unwrap();
        assert_eq!(
            filter,
            FilterOp::Compare(
                AttrPath {
                    attribute: "name".to_string(),
                    sub_attribute: Some("familyName".to_string())
                },
                CompareOp::Co,
                FilterValue::Str("Doe".to_string())
            )
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_filter("userName eq").is_err());
        assert!(parse_filter("userName zz \"x\"").is_err());
        assert!(parse_filter("(userName eq \"x\"").is_err());
        assert!(parse_filter("userName eq \"x").is_err());
        assert!(parse_filter("userName eq \"x\" garbage").is_err());
    }

    #[test]
    fn test_evaluation_basics() {
        let alice = user("alice", true);
        assert!(parse_filter("userName eq \"ALICE\"").unwrap().matches(&alice));
        assert!(parse_filter("userName sw \"al\"").unwrap().matches(&alice));
        assert!(!parse_filter("userName eq \"bob\"").unwrap().matches(&alice));
        assert!(parse_filter("active eq true").unwrap().matches(&alice));
        assert!(parse_filter("userName pr").unwrap().matches(&alice));
        assert!(!parse_filter("title pr").unwrap().matches(&alice));
    }

    #[test]
    fn test_evaluation_type_mismatch_is_false() {
        let alice = user("alice", true);
        // numeric literal against a string attribute: lenient false
        assert!(!parse_filter("userName gt 42").unwrap().matches(&alice));
        // boolean literal against a string attribute
        assert!(!parse_filter("userName eq true").unwrap().matches(&alice));
    }

    #[test]
    fn test_negation_law() {
        // For objects where the referenced attributes are present, exactly
        // one of F and not-F holds.
        let filters = [
            "userName eq \"alice\"",
            "userName co \"li\"",
            "userName gt \"b\"",
            "active eq false",
            "userName pr",
        ];
        for (name, active) in [("alice", true), ("bob", false)] {
            let object = user(name, active);
            for f in filters {
                let parsed = parse_filter(f).unwrap();
                let truth = parsed.matches(&object);
                assert_ne!(truth, !parsed.matches(&object), "filter {}", f);
            }
        }
    }

    #[test]
    fn test_plural_path_evaluation() {
        let emails_desc = core::USER.attribute("emails").unwrap();
        let value_desc = emails_desc.sub_attribute("value").unwrap().clone();
        let type_desc = emails_desc.sub_attribute("type").unwrap().clone();
        let element = ScimAttribute::complex_value(
            emails_desc,
            vec![
                ScimAttribute::singular(&value_desc, ScimValue::Str("a@example.com".into()))
                    .unwrap(),
                ScimAttribute::singular(&type_desc, ScimValue::Str("work".into())).unwrap(),
            ],
        )
        .unwrap();
        let mut object = user("alice", true);
        object.add_attribute(ScimAttribute::plural(emails_desc, vec![element]).unwrap());

        assert!(parse_filter("emails eq \"a@example.com\"").unwrap().matches(&object));
        assert!(parse_filter("emails.type eq \"work\"").unwrap().matches(&object));
        assert!(!parse_filter("emails.type eq \"home\"").unwrap().matches(&object));
    }
}

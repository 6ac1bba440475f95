//! A PromQL expression walker.
//!
//! Dashboard panels and alert rules carry PromQL expressions; the syncers
//! only need to know which metrics an expression touches, which label
//! matchers it applies, and which aggregations it runs. This walker
//! tokenises the expression with nom and classifies identifiers by their
//! following token, which is enough for those questions without a full
//! grammar. Grafana template variables (`$var`, `${var}`, `[[var]]`) are
//! flagged but never resolved.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{anychar, char, multispace1},
    combinator::{map, recognize},
    sequence::{delimited, pair, preceded},
    IResult,
};
use serde::{Deserialize, Serialize};

/// Comparison operator of one label matcher
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `=~`
    Re,
    /// `!~`
    NotRe,
}

/// One `label <op> "value"` matcher
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    /// Label name
    pub name: String,
    /// Operator
    pub op: MatchOp,
    /// Right-hand value, unresolved template variables included
    pub value: String,
}

/// What a PromQL expression touches
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryInsights {
    /// Metric names referenced, in first-appearance order
    pub metrics: Vec<String>,
    /// Label matchers applied to any selector
    pub label_matchers: Vec<LabelMatcher>,
    /// Aggregation operators used
    pub aggregations: Vec<String>,
    /// Whether unresolved template variables appear anywhere
    pub has_template_variables: bool,
}

const AGGREGATIONS: &[&str] = &[
    "sum", "avg", "min", "max", "count", "count_values", "stddev", "stdvar", "topk", "bottomk",
    "quantile", "group",
];

const KEYWORDS: &[&str] = &[
    "by", "without", "on", "ignoring", "group_left", "group_right", "offset", "bool", "and", "or",
    "unless",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num,
    Symbol(char),
    TemplateVar,
}

fn identifier(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic() || c == '_' || c == ':'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == ':'),
        )),
        |s: &str| Token::Ident(s.to_string()),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, Token> {
    let double = delimited(char('"'), map(is_not("\""), str::to_string), char('"'));
    let single = delimited(char('\''), map(is_not("'"), str::to_string), char('\''));
    let empty_double = map(tag("\"\""), |_| String::new());
    let empty_single = map(tag("''"), |_| String::new());
    map(alt((empty_double, empty_single, double, single)), Token::Str)(input)
}

fn template_var(input: &str) -> IResult<&str, Token> {
    let dollar_braced = recognize(preceded(tag("${"), pair(is_not("}"), char('}'))));
    let dollar = recognize(preceded(
        char('$'),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ));
    let bracketed = recognize(delimited(tag("[["), is_not("]"), tag("]]")));
    map(alt((dollar_braced, dollar, bracketed)), |_| Token::TemplateVar)(input)
}

// numbers and durations ("0.05", "5m", "1h30m") are one opaque token so a
// duration's unit letter is never mistaken for a metric name
fn number(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_digit()),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '.'),
        )),
        |_| Token::Num,
    )(input)
}

fn token(input: &str) -> IResult<&str, Option<Token>> {
    alt((
        map(multispace1, |_| None),
        map(template_var, Some),
        map(string_literal, Some),
        map(number, Some),
        map(identifier, Some),
        map(anychar, |c| Some(Token::Symbol(c))),
    ))(input)
}

fn tokenize(mut input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    while !input.is_empty() {
        match token(input) {
            Ok((rest, tok)) => {
                if let Some(tok) = tok {
                    tokens.push(tok);
                }
                input = rest;
            }
            Err(_) => break,
        }
    }
    tokens
}

/// Walk one expression
#[must_use]
pub fn walk(expr: &str) -> QueryInsights {
    let tokens = tokenize(expr);
    let mut insights = QueryInsights::default();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::TemplateVar => insights.has_template_variables = true,
            Token::Ident(name) => {
                let next = tokens.get(i + 1);
                let lowered = name.to_ascii_lowercase();
                if matches!(lowered.as_str(), "by" | "without")
                    && matches!(next, Some(Token::Symbol('(')))
                {
                    // grouping label list, not selectors
                    i = skip_parens(&tokens, i + 1);
                    continue;
                }
                if KEYWORDS.contains(&lowered.as_str()) {
                    i += 1;
                    continue;
                }
                let is_aggregation = AGGREGATIONS.contains(&lowered.as_str());
                match next {
                    Some(Token::Symbol('(')) => {
                        if is_aggregation && !insights.aggregations.contains(&lowered) {
                            insights.aggregations.push(lowered);
                        }
                    }
                    Some(Token::Ident(k))
                        if is_aggregation && matches!(k.as_str(), "by" | "without") =>
                    {
                        if !insights.aggregations.contains(&lowered) {
                            insights.aggregations.push(lowered);
                        }
                    }
                    Some(Token::Symbol('{')) => {
                        push_unique(&mut insights.metrics, name);
                        i = consume_matchers(&tokens, i + 1, &mut insights);
                        continue;
                    }
                    _ => push_unique(&mut insights.metrics, name),
                }
            }
            // a bare selector: {job="x"} with no metric name
            Token::Symbol('{') => {
                i = consume_matchers(&tokens, i, &mut insights);
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    insights
}

/// Consume `{name op "value", ...}` starting at the `{`, returning the index
/// just past the closing brace
fn consume_matchers(tokens: &[Token], open: usize, insights: &mut QueryInsights) -> usize {
    let mut i = open + 1;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Symbol('}') => return i + 1,
            Token::TemplateVar => {
                insights.has_template_variables = true;
                i += 1;
            }
            Token::Ident(label) => {
                let (op, skip) = match (tokens.get(i + 1), tokens.get(i + 2)) {
                    (Some(Token::Symbol('=')), Some(Token::Symbol('~'))) => (Some(MatchOp::Re), 3),
                    (Some(Token::Symbol('!')), Some(Token::Symbol('='))) => (Some(MatchOp::Ne), 3),
                    (Some(Token::Symbol('!')), Some(Token::Symbol('~'))) => (Some(MatchOp::NotRe), 3),
                    (Some(Token::Symbol('=')), _) => (Some(MatchOp::Eq), 2),
                    _ => (None, 1),
                };
                match (op, tokens.get(i + skip)) {
                    (Some(op), Some(Token::Str(value))) => {
                        if value.contains('$') || value.contains("[[") {
                            insights.has_template_variables = true;
                        }
                        insights.label_matchers.push(LabelMatcher {
                            name: label.clone(),
                            op,
                            value: value.clone(),
                        });
                        i += skip + 1;
                    }
                    (Some(op), Some(Token::TemplateVar)) => {
                        insights.has_template_variables = true;
                        insights.label_matchers.push(LabelMatcher {
                            name: label.clone(),
                            op,
                            value: "$__template".to_string(),
                        });
                        i += skip + 1;
                    }
                    _ => i += 1,
                }
            }
            _ => i += 1,
        }
    }
    i
}

/// Skip a parenthesised group starting at the `(`, returning the index just
/// past the matching `)`
fn skip_parens(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < tokens.len() {
        match tokens[i] {
            Token::Symbol('(') => depth += 1,
            Token::Symbol(')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    i
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

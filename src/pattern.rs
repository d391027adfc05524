//! Pointer-type patterns such as `touch*2` or `pen | (mouse + touch)`.
//!
//! A pattern is parsed once at registration and expanded into alternatives,
//! each an ordered list of roles. Matching binds live pointers to roles.

use std::fmt;

use crate::error::ConfigurationError;
use crate::pointer::PointerKind;

const MAX_ALTERNATIVES: usize = 32;
const MAX_ROLES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindMatcher {
    Kind(PointerKind),
    Any,
}

impl KindMatcher {
    pub fn matches(&self, kind: PointerKind) -> bool {
        match self {
            KindMatcher::Kind(k) => *k == kind,
            KindMatcher::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    roles: Vec<KindMatcher>,
}

impl Alternative {
    pub fn roles(&self) -> &[KindMatcher] {
        &self.roles
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    alternatives: Vec<Alternative>,
}

impl Pattern {
    pub fn parse(source: &str) -> Result<Self, ConfigurationError> {
        let malformed = |reason: String| ConfigurationError::MalformedPattern {
            pattern: source.to_string(),
            reason,
        };
        let tokens = tokenize(source).map_err(malformed)?;
        if tokens.is_empty() {
            return Err(malformed("pattern is empty".into()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let alts = parser.expr().map_err(malformed)?;
        if let Some(tok) = parser.peek() {
            return Err(malformed(format!("unexpected {tok}")));
        }
        Ok(Self {
            source: source.trim().to_string(),
            alternatives: alts.into_iter().map(|roles| Alternative { roles }).collect(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    pub fn min_arity(&self) -> usize {
        self.alternatives.iter().map(Alternative::len).min().unwrap_or(0)
    }

    pub fn max_arity(&self) -> usize {
        self.alternatives.iter().map(Alternative::len).max().unwrap_or(0)
    }

    /// Binds `kinds` (live pointers, oldest first) to the roles of the first
    /// alternative that yields an accepted assignment. Returns indices into
    /// `kinds` in role order.
    pub fn bind<F>(&self, kinds: &[PointerKind], min_len: usize, mut accept: F) -> Option<Vec<usize>>
    where
        F: FnMut(&[usize]) -> bool,
    {
        for alt in &self.alternatives {
            if alt.len() < min_len || alt.len() > kinds.len() {
                continue;
            }
            let mut used = vec![false; kinds.len()];
            let mut chosen = Vec::with_capacity(alt.len());
            if search(&alt.roles, kinds, &mut used, &mut chosen, &mut accept) {
                return Some(chosen);
            }
        }
        None
    }

    /// True when `kinds` fit into a strictly larger alternative, i.e. these
    /// pointers could be the beginning of this pattern.
    pub fn could_extend(&self, kinds: &[PointerKind], min_len: usize) -> bool {
        self.alternatives
            .iter()
            .filter(|alt| alt.len() > kinds.len() && alt.len() >= min_len)
            .any(|alt| {
                let mut taken = vec![false; alt.len()];
                embed(&alt.roles, kinds, 0, &mut taken)
            })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn search<F>(
    roles: &[KindMatcher],
    kinds: &[PointerKind],
    used: &mut [bool],
    chosen: &mut Vec<usize>,
    accept: &mut F,
) -> bool
where
    F: FnMut(&[usize]) -> bool,
{
    let depth = chosen.len();
    let Some(role) = roles.get(depth) else {
        return accept(chosen);
    };
    // identical neighbouring roles take pointers in arrival order
    let start = match (depth.checked_sub(1), chosen.last()) {
        (Some(prev), Some(&last)) if roles[prev] == *role => last + 1,
        _ => 0,
    };
    for i in start..kinds.len() {
        if used[i] || !role.matches(kinds[i]) {
            continue;
        }
        used[i] = true;
        chosen.push(i);
        if search(roles, kinds, used, chosen, accept) {
            return true;
        }
        chosen.pop();
        used[i] = false;
    }
    false
}

fn embed(roles: &[KindMatcher], kinds: &[PointerKind], next: usize, taken: &mut [bool]) -> bool {
    let Some(kind) = kinds.get(next) else {
        return true;
    };
    for (i, role) in roles.iter().enumerate() {
        if taken[i] || !role.matches(*kind) {
            continue;
        }
        taken[i] = true;
        if embed(roles, kinds, next + 1, taken) {
            return true;
        }
        taken[i] = false;
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Kind(KindMatcher),
    Number(u32),
    And,
    Or,
    Star,
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Kind(KindMatcher::Kind(k)) => write!(f, "'{k}'"),
            Token::Kind(KindMatcher::Any) => f.write_str("'any'"),
            Token::Number(n) => write!(f, "'{n}'"),
            Token::And => f.write_str("'+'"),
            Token::Or => f.write_str("'|'"),
            Token::Star => f.write_str("'*'"),
            Token::Open => f.write_str("'('"),
            Token::Close => f.write_str("')'"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut out = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '&' => {
                chars.next();
                out.push(Token::And);
            }
            '|' | ',' => {
                chars.next();
                out.push(Token::Or);
            }
            '*' => {
                chars.next();
                out.push(Token::Star);
            }
            '(' => {
                chars.next();
                out.push(Token::Open);
            }
            ')' => {
                chars.next();
                out.push(Token::Close);
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse::<u32>()
                    .map_err(|_| format!("count '{digits}' is out of range"))?;
                out.push(Token::Number(n));
            }
            c if c.is_alphabetic() => {
                let mut word = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_alphanumeric() && d != '_' {
                        break;
                    }
                    word.push(d.to_ascii_lowercase());
                    chars.next();
                }
                out.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "pen" => Token::Kind(KindMatcher::Kind(PointerKind::Pen)),
                    "touch" => Token::Kind(KindMatcher::Kind(PointerKind::Touch)),
                    "mouse" => Token::Kind(KindMatcher::Kind(PointerKind::Mouse)),
                    "any" => Token::Kind(KindMatcher::Any),
                    other => return Err(format!("unknown pointer type '{other}'")),
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(out)
}

type Alts = Vec<Vec<KindMatcher>>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Alts, String> {
        let mut alts = self.term()?;
        while self.eat(&Token::Or) {
            alts.extend(self.term()?);
            if alts.len() > MAX_ALTERNATIVES {
                return Err(format!("more than {MAX_ALTERNATIVES} alternatives"));
            }
        }
        Ok(alts)
    }

    fn term(&mut self) -> Result<Alts, String> {
        let mut acc = self.factor()?;
        while self.eat(&Token::And) {
            let rhs = self.factor()?;
            acc = product(&acc, &rhs)?;
        }
        Ok(acc)
    }

    fn factor(&mut self) -> Result<Alts, String> {
        if let Some(Token::Number(n)) = self.peek().cloned() {
            self.pos += 1;
            self.eat(&Token::Star);
            let atom = self.atom()?;
            return repeat(&atom, n);
        }
        let atom = self.atom()?;
        if self.eat(&Token::Star) {
            return match self.peek().cloned() {
                Some(Token::Number(n)) => {
                    self.pos += 1;
                    repeat(&atom, n)
                }
                Some(tok) => Err(format!("expected a count after '*', found {tok}")),
                None => Err("expected a count after '*'".into()),
            };
        }
        Ok(atom)
    }

    fn atom(&mut self) -> Result<Alts, String> {
        match self.peek().cloned() {
            Some(Token::Kind(m)) => {
                self.pos += 1;
                Ok(vec![vec![m]])
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.expr()?;
                if !self.eat(&Token::Close) {
                    return Err("missing ')'".into());
                }
                Ok(inner)
            }
            Some(tok) => Err(format!("expected a pointer type, found {tok}")),
            None => Err("expected a pointer type, found end of pattern".into()),
        }
    }
}

fn product(lhs: &Alts, rhs: &Alts) -> Result<Alts, String> {
    if lhs.len() * rhs.len() > MAX_ALTERNATIVES {
        return Err(format!("more than {MAX_ALTERNATIVES} alternatives"));
    }
    let mut out = Vec::with_capacity(lhs.len() * rhs.len());
    for a in lhs {
        for b in rhs {
            if a.len() + b.len() > MAX_ROLES {
                return Err(format!("more than {MAX_ROLES} pointers in one alternative"));
            }
            let mut roles = a.clone();
            roles.extend_from_slice(b);
            out.push(roles);
        }
    }
    Ok(out)
}

fn repeat(atom: &Alts, n: u32) -> Result<Alts, String> {
    if n == 0 {
        return Err("count must be at least 1".into());
    }
    if n as usize > MAX_ROLES {
        return Err(format!("more than {MAX_ROLES} pointers in one alternative"));
    }
    let mut acc = atom.clone();
    for _ in 1..n {
        acc = product(&acc, atom)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use PointerKind::{Mouse, Pen, Touch};

    fn roles(p: &Pattern) -> Vec<Vec<KindMatcher>> {
        p.alternatives().iter().map(|a| a.roles().to_vec()).collect()
    }

    #[test]
    fn test_parse_single_kind() {
        let p = Pattern::parse("touch").unwrap();
        assert_eq!(roles(&p), vec![vec![KindMatcher::Kind(Touch)]]);
        assert_eq!(p.min_arity(), 1);
    }

    #[test]
    fn test_repetition_forms_are_equivalent() {
        let a = Pattern::parse("touch*2").unwrap();
        let b = Pattern::parse("2 touch").unwrap();
        let c = Pattern::parse("touch + TOUCH").unwrap();
        assert_eq!(roles(&a), roles(&b));
        assert_eq!(roles(&a), roles(&c));
        assert_eq!(a.max_arity(), 2);
    }

    #[test]
    fn test_or_and_grouping_expand_to_alternatives() {
        let p = Pattern::parse("pen | (mouse and touch)").unwrap();
        assert_eq!(
            roles(&p),
            vec![
                vec![KindMatcher::Kind(Pen)],
                vec![KindMatcher::Kind(Mouse), KindMatcher::Kind(Touch)],
            ]
        );
        assert_eq!(p.min_arity(), 1);
        assert_eq!(p.max_arity(), 2);
    }

    #[test]
    fn test_distributes_over_groups() {
        let p = Pattern::parse("(pen | mouse) + touch").unwrap();
        assert_eq!(p.alternatives().len(), 2);
        assert!(p.alternatives().iter().all(|a| a.len() == 2));
    }

    #[test]
    fn test_malformed_patterns_are_rejected() {
        for bad in ["", "   ", "finger", "touch +", "(touch", "touch*0", "touch*", "2", "touch)"] {
            let err = Pattern::parse(bad).unwrap_err();
            assert!(
                matches!(err, ConfigurationError::MalformedPattern { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_oversized_patterns_are_rejected() {
        assert!(Pattern::parse("touch*17").is_err());
        assert!(Pattern::parse("(pen|touch|mouse)*4").is_err());
    }

    #[test]
    fn test_bind_prefers_arrival_order() {
        let p = Pattern::parse("touch*2").unwrap();
        let got = p.bind(&[Touch, Pen, Touch, Touch], 2, |_| true).unwrap();
        assert_eq!(got, vec![0, 2]);
    }

    #[test]
    fn test_bind_backtracks_for_any_roles() {
        let p = Pattern::parse("any + touch").unwrap();
        let got = p.bind(&[Touch, Pen], 2, |_| true).unwrap();
        assert_eq!(got, vec![1, 0]);
    }

    #[test]
    fn test_bind_consults_acceptance() {
        let p = Pattern::parse("touch*2").unwrap();
        // reject anything including the first (stale) pointer
        let got = p
            .bind(&[Touch, Touch, Touch], 2, |idx| !idx.contains(&0))
            .unwrap();
        assert_eq!(got, vec![1, 2]);
        assert!(p.bind(&[Touch, Touch], 2, |_| false).is_none());
    }

    #[test]
    fn test_bind_skips_alternatives_below_minimum() {
        let p = Pattern::parse("touch | touch*2").unwrap();
        assert_eq!(p.bind(&[Touch, Touch], 2, |_| true).unwrap(), vec![0, 1]);
        assert!(p.bind(&[Touch], 2, |_| true).is_none());
    }

    #[test]
    fn test_could_extend() {
        let zoom = Pattern::parse("touch*2").unwrap();
        assert!(zoom.could_extend(&[Touch], 2));
        assert!(!zoom.could_extend(&[Pen], 2));
        assert!(!zoom.could_extend(&[Touch, Touch], 2));

        let mixed = Pattern::parse("pen | mouse + touch").unwrap();
        assert!(mixed.could_extend(&[Touch], 1));
        assert!(!mixed.could_extend(&[Pen], 1));
    }
}

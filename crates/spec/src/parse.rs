//! Spec string syntax
//!
//! `name@versions %compiler@versions +flag ~flag key=value arch=p-o-t ^dep`
//!
//! Dependencies after `^` are flat: `a ^b ^c` constrains both `b` and `c`
//! somewhere below `a`. An optional `^[build,link]name` fixes edge types.

use sprig_errors::SpecError;
use sprig_types::{ArchSpec, CompilerSpec, DepTypes, VariantValue, VersionConstraint};
use std::fmt;
use std::str::FromStr;

use crate::spec::{DependencySpec, Spec};

#[derive(Debug, PartialEq)]
enum Token {
    Name(String),
    Version(String),
    Compiler(String),
    On(String),
    Off(String),
    KeyValue(String, String),
    Dep(DepTypes),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_')
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | ',' | '=')
}

fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ',' | ':')
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> SpecError {
        SpecError::Parse {
            input: self.input.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn word(&mut self, what: &str, pred: impl Fn(char) -> bool) -> Result<String, SpecError> {
        let word = self.take_while(pred);
        if word.is_empty() {
            return Err(self.error(format!("expected {what} at offset {}", self.pos)));
        }
        Ok(word.to_string())
    }

    fn tokens(mut self) -> Result<Vec<Token>, SpecError> {
        let mut tokens = Vec::new();
        loop {
            self.take_while(char::is_whitespace);
            let Some(c) = self.peek() else {
                return Ok(tokens);
            };
            self.pos += c.len_utf8();
            let token = match c {
                '@' => Token::Version(self.word("version", is_version_char)?),
                '%' => Token::Compiler(self.word("compiler name", is_name_char)?),
                '+' => Token::On(self.word("variant name", is_name_char)?),
                '~' => Token::Off(self.word("variant name", is_name_char)?),
                '^' => {
                    let mut types = DepTypes::empty();
                    if self.peek() == Some('[') {
                        self.pos += 1;
                        let list = self.take_while(|c| c != ']');
                        if self.peek() != Some(']') {
                            return Err(self.error("unterminated dependency type list"));
                        }
                        self.pos += 1;
                        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                            types |= DepTypes::parse_name(name).ok_or_else(|| {
                                self.error(format!("unknown dependency type {name}"))
                            })?;
                        }
                    }
                    Token::Dep(types)
                }
                c if is_name_char(c) => {
                    self.pos -= c.len_utf8();
                    let word = self.word("name", is_name_char)?;
                    if self.peek() == Some('=') {
                        self.pos += 1;
                        let value = self.word("value", is_value_char)?;
                        Token::KeyValue(word, value)
                    } else {
                        Token::Name(word)
                    }
                }
                other => return Err(self.error(format!("unexpected character {other:?}"))),
            };
            tokens.push(token);
        }
    }
}

/// Parser state for the segment currently receiving attributes
struct Segment {
    spec: Spec,
    types: DepTypes,
    touched: bool,
    after_compiler: bool,
}

impl Segment {
    fn new(types: DepTypes) -> Self {
        Self {
            spec: Spec::default(),
            types,
            touched: false,
            after_compiler: false,
        }
    }

    fn apply(&mut self, token: Token, input: &str) -> Result<(), SpecError> {
        let err = |message: String| SpecError::Parse {
            input: input.to_string(),
            message,
        };
        let after_compiler = std::mem::take(&mut self.after_compiler);
        match token {
            Token::Name(name) => {
                if self.touched {
                    return Err(err(format!("unexpected package name {name}")));
                }
                self.spec.name = name;
            }
            Token::Version(text) => {
                let constraint: VersionConstraint =
                    text.parse().map_err(|e: sprig_errors::VersionError| err(e.to_string()))?;
                match self.spec.compiler.as_mut() {
                    Some(compiler) if after_compiler => compiler.version = constraint,
                    _ if !self.spec.versions.is_any() => {
                        return Err(err("version given twice".to_string()));
                    }
                    _ => self.spec.versions = constraint,
                }
            }
            Token::Compiler(name) => {
                if self.spec.compiler.is_some() {
                    return Err(err("compiler given twice".to_string()));
                }
                self.spec.compiler = Some(CompilerSpec::new(name, VersionConstraint::Any));
                self.after_compiler = true;
            }
            Token::On(name) => self.set_variant(name, VariantValue::Bool(true), &err)?,
            Token::Off(name) => self.set_variant(name, VariantValue::Bool(false), &err)?,
            Token::KeyValue(key, value) => match key.as_str() {
                "arch" => {
                    let arch = ArchSpec::parse_triple(&value)
                        .ok_or_else(|| err(format!("arch must be platform-os-target: {value}")))?;
                    self.spec.arch = self
                        .spec
                        .arch
                        .merge(&arch)
                        .ok_or_else(|| err(format!("conflicting arch {value}")))?;
                }
                "platform" => self.spec.arch.platform = Some(value),
                "os" => self.spec.arch.os = Some(value),
                "target" => self.spec.arch.target = Some(value),
                _ => self.set_variant(key, VariantValue::parse(&value), &err)?,
            },
            Token::Dep(_) => return Err(err("misplaced dependency marker".to_string())),
        }
        self.touched = true;
        Ok(())
    }

    fn set_variant(
        &mut self,
        name: String,
        value: VariantValue,
        err: &dyn Fn(String) -> SpecError,
    ) -> Result<(), SpecError> {
        if self.spec.variants.contains_key(&name) {
            return Err(err(format!("variant {name} given twice")));
        }
        self.spec.variants.insert(name, value);
        Ok(())
    }
}

impl FromStr for Spec {
    type Err = SpecError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let tokens = Lexer::new(input).tokens()?;
        let mut root = Segment::new(DepTypes::empty());
        let mut deps: Vec<Segment> = Vec::new();

        for token in tokens {
            if let Token::Dep(types) = token {
                deps.push(Segment::new(types));
                continue;
            }
            let segment = deps.last_mut().unwrap_or(&mut root);
            segment.apply(token, input)?;
        }

        let mut spec = root.spec;
        for dep in deps {
            if dep.spec.is_anonymous() {
                return Err(SpecError::Parse {
                    input: input.to_string(),
                    message: "dependency after ^ needs a name".to_string(),
                });
            }
            let incoming = Spec {
                name: spec.name.clone(),
                dependencies: vec![DependencySpec {
                    spec: dep.spec,
                    types: dep.types,
                }],
                ..Spec::default()
            };
            spec = spec.merge_constraints(&incoming)?;
        }
        spec.dependencies.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        Ok(spec)
    }
}

/// `+name`, `~name` or `name=value`
#[must_use]
pub fn format_variant(name: &str, value: &VariantValue) -> String {
    match value {
        VariantValue::Bool(true) => format!("+{name}"),
        VariantValue::Bool(false) => format!("~{name}"),
        other => format!("{name}={other}"),
    }
}

fn write_node(spec: &Spec, out: &mut String) {
    out.push_str(&spec.name);
    if !spec.versions.is_any() {
        out.push('@');
        out.push_str(&spec.versions.to_string());
    }
    if let Some(compiler) = &spec.compiler {
        out.push('%');
        out.push_str(&compiler.to_string());
    }
    for (name, value) in &spec.variants {
        if matches!(value, VariantValue::Bool(_)) {
            out.push_str(&format_variant(name, value));
        }
    }
    for (name, value) in &spec.variants {
        if !matches!(value, VariantValue::Bool(_)) {
            out.push(' ');
            out.push_str(&format_variant(name, value));
        }
    }
    if spec.arch.is_concrete() {
        out.push_str(" arch=");
        out.push_str(&spec.arch.to_string());
    } else {
        for (key, value) in [
            ("platform", &spec.arch.platform),
            ("os", &spec.arch.os),
            ("target", &spec.arch.target),
        ] {
            if let Some(value) = value {
                out.push_str(&format!(" {key}={value}"));
            }
        }
    }
}

fn write_deps(spec: &Spec, out: &mut String) {
    let mut deps: Vec<&DependencySpec> = spec.dependencies.iter().collect();
    deps.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
    for dep in deps {
        out.push_str(" ^");
        if !dep.types.is_empty() {
            out.push_str(&format!("[{}]", dep.types));
        }
        write_node(&dep.spec, out);
        write_deps(&dep.spec, out);
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_node(self, &mut out);
        write_deps(self, &mut out);
        f.write_str(out.trim_start())
    }
}

//! Resource and entry-point discovery for WGSL kernels.
//!
//! This is a shallow token walk, not a WGSL parser. It understands comments,
//! attributes, `fn` items and `const` declarations with literal values, which is
//! all the pipeline builder needs to check a kernel against its binding layout
//! before handing it to the device.

use std::collections::{BTreeSet, HashMap};

/// What a kernel declares to the outside world.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelInterface {
    /// Binding slots declared in `@group(0)`.
    pub bindings: BTreeSet<u32>,
    /// Names of `@compute` entry points, in source order.
    pub entry_points: Vec<String>,
    /// Set when some `@group`/`@binding` argument was an expression this walk
    /// cannot evaluate; `bindings` is then incomplete.
    pub unresolved_bindings: bool,
}

impl KernelInterface {
    pub fn scan(src: &str) -> Self {
        Walker::new(src).run()
    }

    pub fn has_entry_point(&self, name: &str) -> bool {
        self.entry_points.iter().any(|e| e == name)
    }
}

// ── Walker ────────────────────────────────────────────────────────────────

/// An attribute argument: an integer literal, a `const` name, or anything else.
#[derive(Debug, Copy, Clone)]
enum Arg<'s> {
    Literal(u32),
    Name(&'s str),
    Opaque,
}

struct Walker<'s> {
    src: &'s str,
    pos: usize,
    group: Option<Arg<'s>>,
    binding: Option<Arg<'s>>,
    compute: bool,
    /// `(group, binding)` pairs; names resolve once every `const` is known.
    declared: Vec<(Arg<'s>, Arg<'s>)>,
    consts: HashMap<&'s str, u32>,
    out: KernelInterface,
}

impl<'s> Walker<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: 0,
            group: None,
            binding: None,
            compute: false,
            declared: Vec::new(),
            consts: HashMap::new(),
            out: KernelInterface::default(),
        }
    }

    fn run(mut self) -> KernelInterface {
        loop {
            self.skip_trivia();
            let Some(ch) = self.peek() else { break };
            match ch {
                '@' => {
                    self.advance();
                    self.skip_trivia();
                    let attr = self.ident();
                    self.attribute(attr);
                }
                ';' => {
                    self.advance();
                    self.group = None;
                    self.binding = None;
                }
                c if c.is_alphabetic() || c == '_' => match self.ident() {
                    "fn" => {
                        self.skip_trivia();
                        let name = self.ident();
                        if self.compute && !name.is_empty() {
                            self.out.entry_points.push(name.to_string());
                        }
                        self.compute = false;
                    }
                    "const" => self.const_decl(),
                    _ => {}
                },
                _ => {
                    self.advance();
                }
            }
        }
        self.resolve()
    }

    fn resolve(mut self) -> KernelInterface {
        for (group, binding) in std::mem::take(&mut self.declared) {
            match (self.value(group), self.value(binding)) {
                (Some(0), Some(binding)) => {
                    self.out.bindings.insert(binding);
                }
                (Some(_), Some(_)) => {}
                _ => self.out.unresolved_bindings = true,
            }
        }
        self.out
    }

    fn value(&self, arg: Arg<'s>) -> Option<u32> {
        match arg {
            Arg::Literal(v) => Some(v),
            Arg::Name(name) => self.consts.get(name).copied(),
            Arg::Opaque => None,
        }
    }

    fn attribute(&mut self, attr: &'s str) {
        match attr {
            "group" => self.group = Some(self.argument()),
            "binding" => self.binding = Some(self.argument()),
            "compute" => self.compute = true,
            _ => {}
        }
        if let (Some(group), Some(binding)) = (self.group, self.binding) {
            self.declared.push((group, binding));
            self.group = None;
            self.binding = None;
        }
    }

    /// Reads `( literal )` or `( name )`; anything else is [`Arg::Opaque`].
    fn argument(&mut self) -> Arg<'s> {
        self.skip_trivia();
        if self.peek() != Some('(') {
            return Arg::Opaque;
        }
        self.advance();
        self.skip_trivia();
        let arg = match self.peek() {
            Some(c) if c.is_ascii_digit() => self.literal().map_or(Arg::Opaque, Arg::Literal),
            Some(c) if c.is_alphabetic() || c == '_' => Arg::Name(self.ident()),
            _ => Arg::Opaque,
        };
        self.skip_trivia();
        if self.peek() == Some(')') {
            self.advance();
            arg
        } else {
            Arg::Opaque
        }
    }

    /// `const NAME [: type] = <integer literal>;`
    fn const_decl(&mut self) {
        self.skip_trivia();
        let name = self.ident();
        self.skip_trivia();
        if self.peek() == Some(':') {
            while !matches!(self.peek(), None | Some('=' | ';')) {
                self.advance();
            }
        }
        if self.peek() != Some('=') {
            return;
        }
        self.advance();
        self.skip_trivia();
        if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return;
        }
        let value = self.literal();
        self.skip_trivia();
        if let (Some(value), Some(';'), false) = (value, self.peek(), name.is_empty()) {
            self.consts.insert(name, value);
        }
    }

    /// Decimal or `0x` hex integer, with an optional `u`/`i` suffix.
    fn literal(&mut self) -> Option<u32> {
        let rest = &self.src[self.pos..];
        let value = if rest.starts_with("0x") || rest.starts_with("0X") {
            self.pos += 2;
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.advance();
            }
            u32::from_str_radix(&self.src[start..self.pos], 16).ok()
        } else {
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
            self.src[start..self.pos].parse::<u32>().ok()
        };
        if matches!(self.peek(), Some('u' | 'i')) {
            self.advance();
        }
        value
    }

    fn ident(&mut self) -> &'s str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        &self.src[start..self.pos]
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.src[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.advance();
            }
            let rest = &self.src[self.pos..];
            if rest.starts_with("//") {
                while !matches!(self.peek(), None | Some('\n')) {
                    self.advance();
                }
            } else if rest.starts_with("/*") {
                self.skip_block_comment();
            } else {
                break;
            }
        }
    }

    // WGSL block comments nest.
    fn skip_block_comment(&mut self) {
        let mut depth = 0usize;
        loop {
            let rest = &self.src[self.pos..];
            if rest.starts_with("/*") {
                depth += 1;
                self.pos += 2;
            } else if rest.starts_with("*/") {
                depth -= 1;
                self.pos += 2;
                if depth == 0 {
                    break;
                }
            } else if self.advance().is_none() {
                break;
            }
        }
    }
}

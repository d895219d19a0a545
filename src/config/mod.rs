//! Replay directive files.
//!
//! One directive per line: `<scope> <key>=<value>[,<key>=<value>...]`. Scopes
//! are described in [`scope`]. Recognized keys are `delta` (microseconds)
//! and `action` (`replay`, `emulate` or `skip`); other keys are ignored.
//!
//! ```text
//! all delta=0
//! HCI_CMD_0x03|0x0003 action=emulate
//! 12-20 action=skip
//! ```

pub mod scope;
pub mod type_table;

pub use scope::{Scope, ScopeResolver, ScopeSpec, Target};
pub use type_table::{MAX_OPCODE_SLOTS, TypeKey, TypeOverrideTable};

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ReplayError, Result};
use crate::sequence::Sequence;
use crate::types::{Action, Attr, Timeval};

/// Longest accepted directive line, in bytes, without its line terminator.
pub const MAX_LINE_LEN: usize = 127;

/// One `key=value` attribute assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Replacement `ts_diff`, in microseconds.
    Delta(i64),
    Action(Action),
    Unknown { key: String, value: String },
}

impl Directive {
    fn apply(&self, attr: &mut Attr) {
        match self {
            Directive::Delta(usec) => attr.ts_diff = Timeval::from_micros(*usec),
            Directive::Action(action) => attr.action = *action,
            Directive::Unknown { .. } => {}
        }
    }
}

/// Parse the attribute part of a line into directives, left to right.
pub fn parse_directives(attrs: &str) -> std::result::Result<Vec<Directive>, String> {
    let attrs = attrs.trim();
    if attrs.is_empty() {
        return Err("missing attributes".to_string());
    }

    attrs
        .split(',')
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("attribute '{}' is not a key=value pair", pair.trim()))?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "delta" => value
                    .parse::<i64>()
                    .ok()
                    .filter(|usec| *usec >= 0)
                    .map(Directive::Delta)
                    .ok_or_else(|| format!("invalid delta '{}'", value)),
                "action" => value.parse::<Action>().map(Directive::Action),
                _ => Ok(Directive::Unknown { key: key.to_string(), value: value.to_string() }),
            }
        })
        .collect()
}

/// Applies directive lines to a sequence and its type override table.
pub struct ConfigParser<'a> {
    seq: &'a mut Sequence,
    types: &'a mut TypeOverrideTable,
    resolver: ScopeResolver,
    line: usize,
}

impl<'a> ConfigParser<'a> {
    pub fn new(seq: &'a mut Sequence, types: &'a mut TypeOverrideTable) -> Self {
        Self { seq, types, resolver: ScopeResolver::new(), line: 0 }
    }

    /// Number of lines consumed so far.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Parse and apply the next line. Blank lines are counted and ignored.
    pub fn parse_line(&mut self, text: &str) -> Result<Scope> {
        self.line += 1;
        let line = self.line;

        let text = text.strip_suffix('\n').unwrap_or(text);
        let text = text.strip_suffix('\r').unwrap_or(text);
        if text.len() > MAX_LINE_LEN {
            return Err(ReplayError::config_error(
                line,
                format!("line is {} bytes, longer than {}", text.len(), MAX_LINE_LEN),
            ));
        }

        let text = text.trim();
        if text.is_empty() {
            return Ok(Scope::default());
        }

        let (literal, attrs) = text
            .split_once(|c: char| c.is_ascii_whitespace())
            .ok_or_else(|| ReplayError::config_error(line, "missing attributes"))?;
        debug!("Parsing scope '{}' on line {}", literal, line);

        let spec = ScopeSpec::parse(literal).map_err(|e| ReplayError::config_error(line, e))?;
        let directives = parse_directives(attrs).map_err(|e| ReplayError::config_error(line, e))?;
        let scope = self
            .resolver
            .resolve(spec, self.seq, self.types)
            .map_err(|e| ReplayError::config_error(line, e))?;

        if scope.is_empty() {
            debug!("Empty scope on line {}, skipping", line);
            return Ok(scope);
        }

        for directive in &directives {
            self.apply(&scope, directive);
        }
        Ok(scope)
    }

    /// Parse every line of `text`, stopping at the first error.
    pub fn parse_str(&mut self, text: &str) -> Result<()> {
        for line in text.split_inclusive('\n') {
            self.parse_line(line)?;
        }
        Ok(())
    }

    fn apply(&mut self, scope: &Scope, directive: &Directive) {
        if let Directive::Unknown { key, value } = directive {
            debug!("Ignoring unknown attribute {}={} on line {}", key, value, self.line);
            return;
        }

        for target in scope.targets() {
            let attr = match target {
                Target::Node(index) => self.seq.node_mut(*index).map(|n| &mut n.attr),
                Target::Slot(key) => self.types.slot_mut(*key),
            };
            let Some(attr) = attr else { continue };
            directive.apply(attr);

            match (target, directive) {
                (Target::Node(i), Directive::Delta(usec)) => debug!("\t[{}] set delta to {}", i + 1, usec),
                (Target::Node(i), Directive::Action(a)) => debug!("\t[{}] set action to '{}'", i + 1, a),
                (Target::Slot(key), Directive::Delta(usec)) => debug!("\t[{}] set delta to {}", key, usec),
                (Target::Slot(key), Directive::Action(a)) => debug!("\t[{}] set action to '{}'", key, a),
                (_, Directive::Unknown { .. }) => {}
            }
        }
    }
}

/// Apply a directive file to `seq`, creating type slots in `types`.
///
/// Returns the number of lines read.
pub fn parse_file(
    path: impl AsRef<Path>,
    seq: &mut Sequence,
    types: &mut TypeOverrideTable,
) -> Result<usize> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ReplayError::file_error(path.to_path_buf(), e))?;

    let mut parser = ConfigParser::new(seq, types);
    parser.parse_str(&text)?;
    info!("Applied {} configuration lines from {}", parser.line(), path.display());
    Ok(parser.line())
}

//! Legacy distribution files: `setup.py` and `PKG-INFO`.
//!
//! `setup.py` is emitted as Python source. Values are rendered as Python
//! literals and wrapped the way `pprint.pformat` wraps them at 80 columns, so
//! the script is byte-stable across builds.

use crate::layout::PackageLayout;
use crate::metadata::Author;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Line width used when wrapping literals.
pub const LITERAL_WIDTH: usize = 80;

/// Metadata version written to `PKG-INFO`.
pub const METADATA_VERSION: &str = "1.1";

/// Placeholder for missing `PKG-INFO` fields.
const UNKNOWN: &str = "UNKNOWN";

/// A Python literal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PyLiteral {
    None,
    Str(String),
    List(Vec<PyLiteral>),
    /// Keys render in sorted order.
    Dict(BTreeMap<String, PyLiteral>),
}

impl From<&str> for PyLiteral {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for PyLiteral {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Option<String>> for PyLiteral {
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::None, Self::Str)
    }
}

impl<T: Into<PyLiteral>> From<Vec<T>> for PyLiteral {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PyLiteral>> From<BTreeMap<String, T>> for PyLiteral {
    fn from(map: BTreeMap<String, T>) -> Self {
        Self::Dict(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl PyLiteral {
    /// Single-line Python representation.
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Str(s) => repr_str(s),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Dict(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", repr_str(k), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }

    /// Representation wrapped to [`LITERAL_WIDTH`] columns.
    #[must_use]
    pub fn pformat(&self) -> String {
        let mut out = String::new();
        PrettyPrinter {
            width: LITERAL_WIDTH,
            out: &mut out,
        }
        .format(self, 0, 0, 0);
        out
    }
}

/// Quote a string the way Python's `repr` does.
fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if !is_printable(c) => {
                let code = c as u32;
                let _ = if code < 0x100 {
                    write!(out, "\\x{code:02x}")
                } else if code < 0x1_0000 {
                    write!(out, "\\u{code:04x}")
                } else {
                    write!(out, "\\U{code:08x}")
                };
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Format characters (Cf) outside the control range.
const FORMAT_RANGES: &[(u32, u32)] = &[
    (0x00ad, 0x00ad),
    (0x0600, 0x0605),
    (0x061c, 0x061c),
    (0x06dd, 0x06dd),
    (0x070f, 0x070f),
    (0x0890, 0x0891),
    (0x08e2, 0x08e2),
    (0x180e, 0x180e),
    (0x200b, 0x200f),
    (0x202a, 0x202e),
    (0x2060, 0x2064),
    (0x2066, 0x206f),
    (0xfeff, 0xfeff),
    (0xfff9, 0xfffb),
    (0x110bd, 0x110bd),
    (0x110cd, 0x110cd),
    (0x13430, 0x1343f),
    (0x1bca0, 0x1bca3),
    (0x1d173, 0x1d17a),
    (0xe0001, 0xe0001),
    (0xe0020, 0xe007f),
];

/// Separators other than the ASCII space (Zs, Zl, Zp).
const SEPARATOR_RANGES: &[(u32, u32)] = &[
    (0x00a0, 0x00a0),
    (0x1680, 0x1680),
    (0x2000, 0x200a),
    (0x2028, 0x2029),
    (0x202f, 0x202f),
    (0x205f, 0x205f),
    (0x3000, 0x3000),
];

/// Python's notion of a printable character: not a control, format,
/// separator (except space), private-use or noncharacter code point.
/// Other unassigned code points count as printable.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    let code = c as u32;
    let within = |ranges: &[(u32, u32)]| ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&code));
    let private_use = (0xe000..=0xf8ff).contains(&code) || code >= 0xf_0000;
    let noncharacter = (0xfdd0..=0xfdef).contains(&code) || code & 0xfffe == 0xfffe;

    !(c.is_control()
        || within(FORMAT_RANGES)
        || within(SEPARATOR_RANGES)
        || private_use
        || noncharacter)
}

fn width_of(s: &str) -> usize {
    s.chars().count()
}

struct PrettyPrinter<'a> {
    width: usize,
    out: &'a mut String,
}

impl PrettyPrinter<'_> {
    fn format(&mut self, value: &PyLiteral, indent: usize, allowance: usize, level: usize) {
        let rep = value.repr();
        let max_width = self.width.saturating_sub(indent + allowance);
        if width_of(&rep) > max_width {
            match value {
                PyLiteral::Str(s) => return self.format_str(s, &rep, indent, allowance, level + 1),
                PyLiteral::List(items) => {
                    self.out.push('[');
                    self.format_items(items, indent, allowance + 1, level + 1);
                    self.out.push(']');
                    return;
                }
                PyLiteral::Dict(map) if !map.is_empty() => {
                    self.out.push('{');
                    self.format_dict_items(map, indent, allowance + 1, level + 1);
                    self.out.push('}');
                    return;
                }
                _ => {}
            }
        }
        self.out.push_str(&rep);
    }

    fn format_items(&mut self, items: &[PyLiteral], indent: usize, allowance: usize, level: usize) {
        let indent = indent + 1;
        let delimiter = format!(",\n{}", " ".repeat(indent));
        for (i, item) in items.iter().enumerate() {
            let last = i + 1 == items.len();
            if i > 0 {
                self.out.push_str(&delimiter);
            }
            self.format(item, indent, if last { allowance } else { 1 }, level);
        }
    }

    fn format_dict_items(
        &mut self,
        map: &BTreeMap<String, PyLiteral>,
        indent: usize,
        allowance: usize,
        level: usize,
    ) {
        let indent = indent + 1;
        let delimiter = format!(",\n{}", " ".repeat(indent));
        for (i, (key, value)) in map.iter().enumerate() {
            let last = i + 1 == map.len();
            let key = repr_str(key);
            self.out.push_str(&key);
            self.out.push_str(": ");
            self.format(
                value,
                indent + width_of(&key) + 2,
                if last { allowance } else { 1 },
                level,
            );
            if !last {
                self.out.push_str(&delimiter);
            }
        }
    }

    /// Split an over-long string into implicitly concatenated chunks at
    /// whitespace boundaries. Top-level strings are parenthesized.
    fn format_str(&mut self, s: &str, rep: &str, mut indent: usize, mut allowance: usize, level: usize) {
        if s.is_empty() {
            self.out.push_str(rep);
            return;
        }
        if level == 1 {
            indent += 1;
            allowance += 1;
        }

        let max_width = self.width.saturating_sub(indent);
        let lines: Vec<&str> = s.split_inclusive('\n').collect();
        let mut chunks = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let last_line = i + 1 == lines.len();
            let line_rep = repr_str(line);
            let line_width = if last_line {
                max_width.saturating_sub(allowance)
            } else {
                max_width
            };
            if width_of(&line_rep) <= line_width {
                chunks.push(line_rep);
                continue;
            }

            let parts = whitespace_parts(line);
            let mut current = String::new();
            for (j, part) in parts.iter().enumerate() {
                let candidate = format!("{current}{part}");
                let part_width = if last_line && j + 1 == parts.len() {
                    max_width.saturating_sub(allowance)
                } else {
                    max_width
                };
                if width_of(&repr_str(&candidate)) > part_width {
                    if !current.is_empty() {
                        chunks.push(repr_str(&current));
                    }
                    current = (*part).to_string();
                } else {
                    current = candidate;
                }
            }
            if !current.is_empty() {
                chunks.push(repr_str(&current));
            }
        }

        if chunks.len() == 1 {
            self.out.push_str(rep);
            return;
        }
        if level == 1 {
            self.out.push('(');
        }
        let separator = format!("\n{}", " ".repeat(indent));
        self.out.push_str(&chunks.join(&separator));
        if level == 1 {
            self.out.push(')');
        }
    }
}

/// Split a line into runs of non-whitespace each followed by its whitespace.
fn whitespace_parts(line: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_space = false;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            in_space = true;
        } else if in_space {
            parts.push(&line[start..i]);
            start = i;
            in_space = false;
        }
    }
    if start < line.len() {
        parts.push(&line[start..]);
    }
    parts
}

/// How `setup()` finds the code to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStrategy {
    /// A directory package with its sub-packages and data.
    Packages(PackageLayout),
    /// A single-file module.
    Module(String),
}

/// The arguments of a generated `setup.py`.
#[derive(Debug, Clone)]
pub struct SetupScript {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: Author,
    pub url: Option<String>,
    pub strategy: InstallStrategy,
    pub install_requires: Vec<String>,
    pub extras_require: BTreeMap<String, Vec<String>>,
    pub entry_points: BTreeMap<String, Vec<String>>,
    pub python_requires: Option<String>,
}

impl SetupScript {
    /// Render the script source.
    #[must_use]
    pub fn render(&self) -> String {
        let mut before = Vec::new();
        let mut extra = Vec::new();

        match &self.strategy {
            InstallStrategy::Packages(layout) => {
                before.push(assignment("packages", &layout.packages.clone().into()));
                before.push(assignment(
                    "package_data",
                    &layout.package_data.clone().into(),
                ));
                extra.push("packages=packages,".to_string());
                extra.push("package_data=package_data,".to_string());
            }
            InstallStrategy::Module(name) => {
                extra.push(format!("py_modules={},", repr_str(name)));
            }
        }

        if !self.install_requires.is_empty() {
            before.push(assignment(
                "install_requires",
                &self.install_requires.clone().into(),
            ));
            extra.push("install_requires=install_requires,".to_string());
        }

        if !self.extras_require.is_empty() {
            before.push(assignment(
                "extras_require",
                &self.extras_require.clone().into(),
            ));
            extra.push("extras_require=extras_require,".to_string());
        }

        if !self.entry_points.is_empty() {
            before.push(assignment("entry_points", &self.entry_points.clone().into()));
            extra.push("entry_points=entry_points,".to_string());
        }

        if let Some(python_requires) = &self.python_requires {
            extra.push(format!("python_requires={},", repr_str(python_requires)));
        }

        let mut script = String::from("from setuptools import setup\n\n");
        script.push_str(&before.join("\n"));
        script.push_str("\nsetup(\n");
        let _ = writeln!(script, "    name={},", repr_str(&self.name));
        let _ = writeln!(script, "    version={},", repr_str(&self.version));
        let _ = writeln!(script, "    description={},", repr_str(&self.description));
        let _ = writeln!(script, "    author={},", repr_str(&self.author.name));
        let _ = writeln!(script, "    author_email={},", repr_str(&self.author.email));
        let _ = writeln!(script, "    url={},", PyLiteral::from(self.url.clone()).repr());
        let _ = writeln!(script, "    {}", extra.join("\n    "));
        script.push_str(")\n");
        script
    }
}

fn assignment(name: &str, value: &PyLiteral) -> String {
    format!("{name} = \\\n{}\n", value.pformat())
}

/// Contents of a `PKG-INFO` file.
#[derive(Debug, Clone)]
pub struct PkgInfo {
    pub name: String,
    pub version: String,
    pub summary: String,
    pub home_page: Option<String>,
    pub author: Author,
}

impl PkgInfo {
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Metadata-Version: {METADATA_VERSION}");
        let _ = writeln!(out, "Name: {}", self.name);
        let _ = writeln!(out, "Version: {}", self.version);
        let _ = writeln!(out, "Summary: {}", self.summary);
        let _ = writeln!(
            out,
            "Home-page: {}",
            self.home_page.as_deref().unwrap_or(UNKNOWN)
        );
        let _ = writeln!(out, "Author: {}", self.author.name);
        let _ = writeln!(out, "Author-email: {}", self.author.email);
        out
    }
}

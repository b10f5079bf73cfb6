use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Serializer;
use serde_json::ser::{Formatter, PrettyFormatter};

use crate::aggregate::Departments;
use crate::types::{Classroom, Period};

pub const DEFAULT_OUTPUT_PATH: &str = "web/scripts/data.js";
pub const DEFAULT_VAR_NAME: &str = "appData";

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Rendered output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// The document loaded by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    pub period_names: Vec<String>,
    pub classrooms: Vec<Classroom>,
    pub departments: Departments,
}

impl AppData {
    pub fn new(periods: &[Period], classrooms: Vec<Classroom>, departments: Departments) -> Self {
        Self {
            period_names: periods.iter().map(|p| p.name.clone()).collect(),
            classrooms,
            departments,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub var_name: String,
    /// Write non-ASCII characters literally instead of as `\uXXXX` escapes.
    pub utf8: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            var_name: DEFAULT_VAR_NAME.to_string(),
            utf8: false,
        }
    }
}

/// Wraps a formatter and escapes every non-ASCII character in strings,
/// using surrogate pairs outside the basic multilingual plane.
struct AsciiFormatter<F>(F);

impl<F: Formatter> Formatter for AsciiFormatter<F> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

/// Renders `const <var_name> = <json>;` with four-space indentation.
pub fn render_js(data: &AppData, options: &OutputOptions) -> Result<String, OutputError> {
    let mut buf = format!("const {} = ", options.var_name).into_bytes();

    let pretty = PrettyFormatter::with_indent(b"    ");
    if options.utf8 {
        let mut serializer = Serializer::with_formatter(&mut buf, pretty);
        data.serialize(&mut serializer)?;
    } else {
        let mut serializer = Serializer::with_formatter(&mut buf, AsciiFormatter(pretty));
        data.serialize(&mut serializer)?;
    }

    buf.push(b';');
    Ok(String::from_utf8(buf)?)
}

pub fn write_js(
    path: impl AsRef<Path>,
    data: &AppData,
    options: &OutputOptions,
) -> Result<(), OutputError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let rendered = render_js(data, options)?;
    fs::write(path, rendered)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

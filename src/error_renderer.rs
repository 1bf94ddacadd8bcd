//! Error rendering using ariadne
//!
//! Dynamic SQL compile errors that point into the SQL text are rendered with
//! the offending snippet underlined. Every other error is rendered as its
//! message, its diagnostic code and any help text.

use crate::{DynamicSqlError, ProcedureError};
use ariadne::{ColorGenerator, Config, IndexType, Label, Report, ReportKind, Source};
use miette::Diagnostic;
use std::io::Write;

const SQL_SOURCE: &str = "<dynamic sql>";

/// Render an error with formatting to stderr
///
/// # Example
/// ```no_run
/// use vproc::{CommandContext, Engine, EngineOptions, MapCatalog, MemoryDataManager, render_error};
///
/// let engine = Engine::new(MapCatalog::new(), EngineOptions::default());
/// let data = MemoryDataManager::new();
/// if let Err(e) = engine.run("pm1.missing", vec![], CommandContext::new("q1"), &data) {
///     render_error(&e);
/// }
/// ```
pub fn render_error(error: &ProcedureError) {
    render_error_to_writer(error, &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
///
/// This is useful when you want to control where the error is written,
/// such as to a file, a buffer, or a log sink.
pub fn render_error_to(error: &ProcedureError, writer: &mut dyn Write) -> std::io::Result<()> {
    render_error_to_writer(error, writer, true)
}

/// Render an error to a String (useful for logs and web UIs)
pub fn render_error_to_string(error: &ProcedureError) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Render an error to a String without color codes (useful for tests)
///
/// This is the same as `render_error_to_string` but without ANSI color codes,
/// making the output easier to compare in tests.
pub fn render_error_to_string_no_color(error: &ProcedureError) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

fn render_error_to_writer(
    error: &ProcedureError,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    match error {
        ProcedureError::DynamicSql {
            sql,
            reason: DynamicSqlError::CompileFailed {
                message,
                span: Some(span),
            },
        } => render_sql_error(error, sql, message, span.clone(), writer, use_color),
        _ => render_plain(error, writer),
    }
}

fn render_sql_error(
    error: &ProcedureError,
    sql: &str,
    message: &str,
    span: std::ops::Range<usize>,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    // Compilers may report a span past the end of the text.
    let end = span.end.min(sql.len());
    let span = span.start.min(end)..end;

    let mut colors = ColorGenerator::new();
    colors.next(); // Skip the first color.

    let mut report = Report::build(ReportKind::Error, (SQL_SOURCE, span.clone()))
        .with_message(error.to_string())
        .with_config(
            Config::default()
                .with_color(use_color)
                .with_index_type(IndexType::Byte),
        );

    if let Some(code) = error.code() {
        report = report.with_code(code);
    }

    report = report.with_label(
        Label::new((SQL_SOURCE, span))
            .with_message(message)
            .with_color(colors.next()),
    );

    if let Some(help) = error.help() {
        report = report.with_help(help);
    }

    report.finish().write((SQL_SOURCE, Source::from(sql)), &mut *writer)
}

fn render_plain(error: &ProcedureError, writer: &mut dyn Write) -> std::io::Result<()> {
    match error.code() {
        Some(code) => writeln!(writer, "Error[{}]: {}", code, error)?,
        None => writeln!(writer, "Error: {}", error)?,
    }
    if let Some(help) = error.help() {
        writeln!(writer, "  help: {}", help)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandContext, Engine, EngineOptions, MapCatalog, MemoryDataManager};

    #[test]
    fn test_render_compile_error_shows_sql() {
        let error = ProcedureError::dynamic(
            "SELECT e1 FRM pm1.g1",
            DynamicSqlError::CompileFailed {
                message: "expected FROM".to_string(),
                span: Some(10..13),
            },
        );
        let output = render_error_to_string_no_color(&error);

        assert!(output.contains("Error"));
        assert!(output.contains("SELECT e1 FRM pm1.g1"));
        assert!(output.contains("expected FROM"));
        assert!(output.contains("vproc::dynamic_sql"));
    }

    #[test]
    fn test_render_span_past_end() {
        let error = ProcedureError::dynamic(
            "SELECT",
            DynamicSqlError::CompileFailed {
                message: "unexpected end of input".to_string(),
                span: Some(6..40),
            },
        );
        let output = render_error_to_string_no_color(&error);
        assert!(output.contains("unexpected end of input"));
    }

    #[test]
    fn test_render_plain_error_with_help() {
        let error = ProcedureError::TempTableExists { name: "#t".into() };
        let output = render_error_to_string_no_color(&error);

        assert_eq!(
            output,
            "Error[vproc::temp_table_exists]: temporary table #t already exists\n  help: drop the table before creating it again\n"
        );
    }

    #[test]
    fn test_render_engine_error() {
        let engine = Engine::new(MapCatalog::new(), EngineOptions::default());
        let data = MemoryDataManager::new();
        let result = engine.run("pm1.missing", vec![], CommandContext::new("q1"), &data);

        let Err(e) = result else {
            panic!("expected an unknown procedure error");
        };
        let output = render_error_to_string_no_color(&e);
        assert!(output.contains("unknown procedure pm1.missing"));
    }
}

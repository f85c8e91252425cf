//! Diagnostic output for the command-line tool.

use std::io::{IsTerminal, Write};

use ariadne::{Color, Fmt};

/// How fatal diagnostics are rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    pub color: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig {
            color: std::io::stderr().is_terminal(),
        }
    }
}

impl DiagnosticsConfig {
    /// Writing to an output file turns color off.
    pub fn for_output(has_output: bool) -> Self {
        if has_output {
            DiagnosticsConfig { color: false }
        } else {
            Self::default()
        }
    }

    fn error_color(&self) -> Option<Color> {
        self.color.then_some(Color::Red)
    }

    /// Render a fatal error as a single line.
    pub fn render_error(&self, error: &dyn std::fmt::Display) -> String {
        format!("{}: {error}", "error".fg(self.error_color()))
    }

    pub fn print_error(&self, error: &dyn std::fmt::Display, out: &mut dyn Write) {
        // Nothing sensible is left to do if stderr itself is gone.
        writeln!(out, "{}", self.render_error(error)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_plain_error() {
        let config = DiagnosticsConfig { color: false };
        assert_snapshot!(config.render_error(&"Need to specify an infile"), @"error: Need to specify an infile");
    }

    #[test]
    fn test_colored_error_keeps_message() {
        let config = DiagnosticsConfig { color: true };
        let rendered = config.render_error(&"boom");
        assert!(rendered.contains("error"));
        assert!(rendered.ends_with(": boom"));
    }

    #[test]
    fn test_output_disables_color() {
        assert!(!DiagnosticsConfig::for_output(true).color);
    }
}

//! Classification of lines coming out of the adapter subprocess.

/// Prefixes that mark a line as program error output. Matches Python
/// tracebacks and the common exception classes as they appear at the
/// start of an interpreter error line.
const ERROR_PREFIXES: &[&str] = &[
    "Traceback",
    "Exception",
    "TypeError:",
    "ValueError:",
    "KeyError:",
    "IndexError:",
    "AttributeError:",
    "NameError:",
    "SyntaxError:",
    "RuntimeError:",
    "ImportError:",
    "ModuleNotFoundError:",
    "FileNotFoundError:",
    "PermissionError:",
];

/// debugpy chatter on stderr that is noise, not program output.
const BOOTSTRAP_MARKERS: &[&str] = &["debugpy", "Waiting for debugger"];

/// True when a (trimmed) line should be reported on the error stream.
pub fn is_error_line(line: &str) -> bool {
    ERROR_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

/// True for adapter bootstrap messages that are suppressed entirely.
pub fn is_bootstrap_noise(line: &str) -> bool {
    BOOTSTRAP_MARKERS.iter().any(|marker| line.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracebacks_and_exceptions_are_errors() {
        assert!(is_error_line("Traceback (most recent call last):"));
        assert!(is_error_line("ValueError: bad input"));
        assert!(is_error_line("ModuleNotFoundError: No module named 'x'"));
        assert!(is_error_line("Exception: boom"));
    }

    #[test]
    fn ordinary_output_is_not_an_error() {
        assert!(!is_error_line("processing item 4"));
        assert!(!is_error_line("value error in the middle"));
        assert!(!is_error_line(""));
    }

    #[test]
    fn bootstrap_chatter_is_suppressed() {
        assert!(is_bootstrap_noise("I+00000.024: debugpy adapter starting"));
        assert!(is_bootstrap_noise("Waiting for debugger attach..."));
        assert!(!is_bootstrap_noise("hello from the program"));
    }
}

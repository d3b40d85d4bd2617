//! Timestamped, colored console narration (spec §10.1), for the surfaces the
//! teacher crate itself narrates this way: startup banner, per-trade lines,
//! reconnect/profit events. Hot-path polling uses `tracing` instead.

/// Print a line prefixed with an RFC3339-microsecond timestamp, the way
/// every `println!` call in the teacher's `app.rs` does it by hand.
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        println!(
            "{} {}",
            chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                .to_string()
                .bright_black(),
            format!($($arg)*)
        );
    }};
}

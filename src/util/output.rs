#![allow(clippy::print_stdout)]

/// User facing output. Diagnostics go through the logger instead.
pub fn print_output(printed_output: &str) {
    println!("{}", printed_output);
}

#[macro_export]
macro_rules! outln {
    ( $fmt:expr $(, $args:expr)*) => {
        $crate::util::print_output(&format!($fmt $(, $args)*))
    };
}

pub mod recording;
pub mod smtlib_printer;
pub mod smtlib_process;
pub mod z3_backend;

mod common;
mod hooks;

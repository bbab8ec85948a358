pub mod task;

pub use task::{
    is_benign_log_noise, JarInvocation, JarRunner, JavaProcessRunner, OutputLine, OutputStream,
};

#[cfg(test)]
pub(crate) use task::testing;

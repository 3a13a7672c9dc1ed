//! Plan rendering

mod dockerfile;

pub use dockerfile::DockerfileRenderer;

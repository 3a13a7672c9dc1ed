use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Two-stage container build pipeline for Python ASGI services
#[derive(Parser, Debug)]
#[command(
    name = "slipcast",
    about = "Two-stage container build pipeline for Python ASGI services",
    version,
    author,
    long_about = "slipcast packages a Python ASGI web service as a minimal container image: \
                  a build stage installs the dependency manifest into an isolated venv, and a \
                  runtime stage assembles a fresh base with the venv, the application source, \
                  a headless JVM, and a fixed entry point bound to port 8080."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Compose the image plan for a build context",
        long_about = "Parses the dependency manifest, composes the two-stage image plan, and \
                      prints it without building anything.\n\n\
                      Examples:\n  \
                      slipcast plan\n  \
                      slipcast plan /path/to/context --format dockerfile\n  \
                      slipcast plan --format yaml -o plan.yaml"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Build the container image",
        long_about = "Runs the full pipeline: validates the context, composes the plan, and \
                      drives docker build. Any failure aborts with no image produced.\n\n\
                      Examples:\n  \
                      slipcast build\n  \
                      slipcast build /path/to/context --tag registry.local:5000/svc:1.0"
    )]
    Build(BuildArgs),

    #[command(about = "Check that a Docker daemon is reachable")]
    Doctor,
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(
        value_name = "PATH",
        help = "Build context directory (defaults to current directory)"
    )]
    pub context: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(
        value_name = "PATH",
        help = "Build context directory (defaults to current directory)"
    )]
    pub context: Option<PathBuf>,

    #[arg(
        short = 't',
        long,
        value_name = "TAG",
        help = "Image tag (defaults to a manifest-fingerprint tag)"
    )]
    pub tag: Option<String>,

    #[arg(
        long,
        value_name = "BIN",
        default_value = "docker",
        help = "Docker binary to invoke"
    )]
    pub docker_bin: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Human,
    Json,
    Yaml,
    Dockerfile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_plan_args() {
        let args = CliArgs::parse_from(["slipcast", "plan"]);
        match args.command {
            Commands::Plan(plan_args) => {
                assert_eq!(plan_args.format, OutputFormatArg::Human);
                assert!(plan_args.context.is_none());
                assert!(plan_args.output.is_none());
            }
            _ => panic!("expected Plan command"),
        }
    }

    #[test]
    fn test_plan_with_format_and_output() {
        let args = CliArgs::parse_from([
            "slipcast",
            "plan",
            "/tmp/ctx",
            "--format",
            "dockerfile",
            "-o",
            "Dockerfile",
        ]);
        match args.command {
            Commands::Plan(plan_args) => {
                assert_eq!(plan_args.context, Some(PathBuf::from("/tmp/ctx")));
                assert_eq!(plan_args.format, OutputFormatArg::Dockerfile);
                assert_eq!(plan_args.output, Some(PathBuf::from("Dockerfile")));
            }
            _ => panic!("expected Plan command"),
        }
    }

    #[test]
    fn test_build_args() {
        let args = CliArgs::parse_from([
            "slipcast",
            "build",
            "/tmp/ctx",
            "--tag",
            "svc:1.0",
            "--docker-bin",
            "podman",
        ]);
        match args.command {
            Commands::Build(build_args) => {
                assert_eq!(build_args.context, Some(PathBuf::from("/tmp/ctx")));
                assert_eq!(build_args.tag, Some("svc:1.0".to_string()));
                assert_eq!(build_args.docker_bin, "podman");
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn test_build_defaults() {
        let args = CliArgs::parse_from(["slipcast", "build"]);
        match args.command {
            Commands::Build(build_args) => {
                assert!(build_args.tag.is_none());
                assert_eq!(build_args.docker_bin, "docker");
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["slipcast", "-v", "plan"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["slipcast", "--log-level", "debug", "doctor"]);
        assert_eq!(args.log_level, Some("debug".to_string()));
    }
}

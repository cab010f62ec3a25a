use argh::FromArgs;
use minish::{Interpreter, Io, ShellConfig};
use std::path::PathBuf;

#[derive(FromArgs)]
/// A small line-oriented shell.
struct Options {
    #[argh(option, short = 'c')]
    /// run a single command line and exit.
    command: Option<String>,

    #[argh(option, default = "100")]
    /// maximum number of shell variables.
    max_variables: usize,

    #[argh(option, default = "PathBuf::from(\"/proc\")")]
    /// root of the kernel process table.
    proc_root: PathBuf,

    #[argh(option, default = "String::from(\"ens33\")")]
    /// network interface reported by `nw -m`.
    interface: String,

    #[argh(option, default = "333")]
    /// system call number of the network control call.
    control_syscall: i64,

    #[argh(option, default = "String::from(\"warn\")")]
    /// log level used when RUST_LOG is not set.
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let options: Options = argh::from_env();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&options.log_level)),
        )
        .init();

    let config = ShellConfig {
        max_variables: options.max_variables,
        proc_root: options.proc_root,
        interface: options.interface,
        control_syscall: options.control_syscall,
        ..ShellConfig::default()
    };
    let mut shell = Interpreter::new(config);

    match options.command {
        Some(line) => {
            let stdout = std::io::stdout();
            let stderr = std::io::stderr();
            let (mut out, mut err) = (stdout.lock(), stderr.lock());
            shell.execute_line(&line, &mut Io::new(&mut out, &mut err));
        }
        None => shell.repl()?,
    }
    Ok(())
}

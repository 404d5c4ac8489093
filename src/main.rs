use anyhow::Context;
use hotch::dbg::ReplayDebugger;
use hotch::model::ElfModel;
use hotch::session::{Session, SessionConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(argh::FromArgs)]
/// breakpoint-sampling execution profiler: replays a recorded debug-event
/// trace against an ELF binary and renders an HTML report
struct Arguments {
    /// the profiled binary
    #[argh(positional)]
    binary: String,

    /// recorded debug events (json)
    #[argh(positional)]
    trace: String,

    #[argh(option, short = 't', default = r#"String::from("template.htm")"#)]
    /// report template
    template: String,

    #[argh(option, short = 'o', default = r#"String::from("results.html")"#)]
    /// where to write the report
    output: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Arguments = argh::from_env();

    let binary = PathBuf::from(&args.binary);

    let model = ElfModel::from_path(&binary)
        .with_context(|| format!("loading {}", binary.display()))?;

    let (dbg, clock) = ReplayDebugger::from_path(&PathBuf::from(&args.trace))
        .with_context(|| format!("loading {}", args.trace))?;

    let cfg = SessionConfig {
        target: binary,
        args: String::new(),
        cwd: String::new(),
        template: PathBuf::from(args.template),
        output: PathBuf::from(args.output),
    };

    let mut session = Session::new(dbg, clock, &model, cfg);
    session.begin()?;
    session.run();

    Ok(())
}

use partscope::bench::{parse_args, run, USAGE};

fn main() -> anyhow::Result<()> {
    // Respect RUST_LOG when set, stay quiet otherwise.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Ok(Some(opts)) => opts,
        Ok(None) => {
            print!("{USAGE}");
            return Ok(());
        }
        Err(e) => {
            eprintln!("error: {e}");
            eprint!("{USAGE}");
            std::process::exit(2);
        }
    };

    let output = run(&opts)?;
    println!("{output}");
    Ok(())
}

use thumbgrid::bench;

fn main() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "thumbgrid=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let code = match bench::maybe_parse_args() {
        Ok(Some(args)) => match bench::run_benchmark(args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Benchmark failed: {:#}", e);
                1
            }
        },
        Ok(None) => {
            eprintln!("{}", bench::USAGE);
            2
        }
        Err(e) => {
            eprintln!("{:#}\n{}", e, bench::USAGE);
            2
        }
    };
    std::process::exit(code);
}

use clap::Parser;

#[derive(Parser)]
#[command(version, about = "Parse and probe V2Ray-family proxy share links", long_about = None)]
pub struct Args {
    #[arg(help = "Share link, or path to a file with one link per line")]
    pub input: Option<String>,

    #[arg(long, default_value_t = 0, help = "Local HTTP inbound port (0 = default 2300)")]
    pub http_port: i32,

    #[arg(long, default_value_t = 0, help = "Local SOCKS inbound port (0 = default 2301)")]
    pub socks_port: i32,

    #[arg(short, long, help = "Run full app-level probes (needs the proxy executable)")]
    pub full: bool,

    #[arg(long, default_value = "v2ray", help = "Proxy executable used for full probes")]
    pub proxy_bin: String,

    #[arg(short, long, default_value_t = 1, help = "Retry budget recorded on full probes (1-5)")]
    pub attempts: u32,

    #[arg(
        long,
        help = "Skip probing; measure TTFB through an already-running proxy listener on this port"
    )]
    pub ttfb_port: Option<u16>,

    #[arg(short, long, help = "Write the JSON report to this path instead of stdout")]
    pub output: Option<String>,

    #[arg(short, long, help = "Emit debug log")]
    pub verbose: bool,
}

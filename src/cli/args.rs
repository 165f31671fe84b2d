use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "listsync",
    version,
    about = "live project listing filter for server-rendered pages",
    long_about = "listsync loads a project listing page, binds to its search box, client selector and filter form, replays your input against the server and prints the listing that results.\n\nExamples:\n  listsync -u http://127.0.0.1:5001/ -q olymp\n  listsync -u http://127.0.0.1:5001/ -k paris_2024_olympics --submit\n  listsync -u http://127.0.0.1:5001/ --interactive\n\nTip: Use --config to persist the site URL and element ids."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'n',
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Listing output format (text, json, html)."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'u',
        long = "u",
        visible_alias = "url",
        value_name = "URL",
        help_heading = "Input",
        help = "Base URL of the site serving the listing."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.listsync/config.yml when it exists)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "ic",
        visible_alias = "init-config",
        help_heading = "Input",
        help = "Write a default config file (at --config or the default path) and exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'q',
        long = "qr",
        visible_alias = "query",
        value_name = "TEXT",
        help_heading = "Interaction",
        help = "Type TEXT into the search box, one input event per character."
    )]
    pub query: Option<String>,

    #[arg(
        short = 'k',
        long = "cl",
        visible_alias = "client",
        value_name = "REF",
        help_heading = "Interaction",
        help = "Choose REF in the client selector (fires a change event)."
    )]
    pub client: Option<String>,

    #[arg(
        short = 's',
        long = "sb",
        visible_alias = "submit",
        help_heading = "Interaction",
        help = "Submit the filter form afterwards and load the client page."
    )]
    pub submit: bool,

    #[arg(
        short = 'i',
        long = "it",
        visible_alias = "interactive",
        help_heading = "Interaction",
        help = "Read interaction commands from stdin (type 'help' for the list)."
    )]
    pub interactive: bool,

    #[arg(
        short = 'd',
        long = "db",
        visible_alias = "debounce-ms",
        value_name = "MS",
        help_heading = "Interaction",
        help = "Wait MS milliseconds after an event before fetching (0 disables)."
    )]
    pub debounce_ms: Option<u64>,

    #[arg(
        short = 'r',
        long = "rc",
        visible_alias = "recovery",
        value_name = "POLICY",
        help_heading = "Interaction",
        help = "What to do when a refresh fails (keep, notice)."
    )]
    pub recovery: Option<String>,

    #[arg(
        short = 'p',
        long = "px",
        visible_alias = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "HTTP proxy URL (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'F',
        long = "nfr",
        visible_alias = "no-follow-redirects",
        help_heading = "HTTP",
        help = "Do not follow HTTP redirects."
    )]
    pub no_follow_redirects: bool,

    #[arg(
        short = 'T',
        long = "to",
        visible_alias = "timeout",
        value_name = "SECONDS",
        help_heading = "HTTP",
        help = "Per-request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'H',
        long = "hdr",
        visible_alias = "header",
        value_name = "HEADER",
        help_heading = "HTTP",
        help = "Add a header to all requests (format: 'Key: Value')."
    )]
    pub header: Option<String>,
}

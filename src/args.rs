use clap::Parser;

/// This is a progress tracker for thermal comfort field studies.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the study: data sources, time zone, policy and outputs.
    /// Relative paths inside the file are resolved from the directory of the file.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference batch summary in JSON format. If provided, comfortbot will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the batch summary will be written in JSON format
    /// to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (RFC 3339 timestamp or empty) Runs the batch as if it was this instant. Useful to replay a
    /// past report or to compare against a reference summary.
    #[clap(long, value_parser)]
    pub now: Option<String>,

    /// (list of participant ids or not specified) If specified, only these participants are processed.
    #[clap(long, value_parser)]
    pub participant: Option<Vec<String>>,

    /// If passed as an argument, the last vote message and the progress report are sent to every
    /// participant regardless of the time of day, and nothing is posted to the operations channel.
    #[clap(long, takes_value = false)]
    pub force: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

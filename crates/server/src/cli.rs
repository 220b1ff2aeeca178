use clap::Parser;

use crate::config::ServerConfig;

/// Multi-tenant bridge server for browser-backed messaging sessions.
#[derive(Debug, Parser)]
#[command(name = "wabridge", version)]
pub struct Cli {
	#[command(flatten)]
	pub config: ServerConfig,

	/// Increase log verbosity (-v, -vv)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cli_parses_minimal_invocation() {
		let cli = Cli::try_parse_from([
			"wabridge",
			"--secret-key",
			"THISISMYSECURETOKEN",
			"--remote-script",
			"./wa-js.bundle.js",
		])
		.unwrap();
		assert_eq!(cli.config.secret_key, "THISISMYSECURETOKEN");
		assert_eq!(cli.config.port, 21465);
		assert!(!cli.config.headful);
		assert_eq!(cli.verbose, 0);
	}

	#[test]
	fn cli_accepts_repeated_browser_args() {
		let cli = Cli::try_parse_from([
			"wabridge",
			"--secret-key",
			"s",
			"--remote-script",
			"bundle.js",
			"--browser-arg",
			"--no-sandbox",
			"--browser-arg",
			"--disable-gpu",
			"-vv",
		])
		.unwrap();
		assert_eq!(cli.config.browser_args, vec!["--no-sandbox", "--disable-gpu"]);
		assert_eq!(cli.verbose, 2);
	}
}

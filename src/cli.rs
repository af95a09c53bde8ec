use crate::{Converter, Format, PlistError, Result};
use clap::{Arg, Command};

pub struct Cli;

impl Cli {
    pub fn build_command() -> Command {
        Command::new("plistconv")
            .about("Converts Apple property lists between XML and binary form")
            .long_about("Converts Apple property lists between the XML and binary (bplist00) representations.\n\nThe input format is detected automatically; the output format is chosen with '-f'. When invoked with the '-i' argument, the output of a successful conversion will overwrite the original input file. Input can be '-' to use stdin, and output can be '-' to use stdout.")
            .arg(
                Arg::new("format")
                    .short('f')
                    .long("format")
                    .value_parser(["xml", "binary"])
                    .default_value("xml")
                    .help("Output format"),
            )
            .arg(
                Arg::new("in-place")
                    .short('i')
                    .long("in-place")
                    .help("Overwrite input file with converted output")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("input")
                    .help("Input file path (use '-' for stdin)")
                    .required(true)
                    .index(1),
            )
            .arg(
                Arg::new("output")
                    .help("Output file path (use '-' for stdout)")
                    .index(2),
            )
    }

    pub fn run() -> Result<()> {
        let matches = Self::build_command().get_matches();
        Self::run_with_matches(matches)
    }

    pub fn run_with_matches(matches: clap::ArgMatches) -> Result<()> {
        let input_path = matches.get_one::<String>("input").unwrap();
        let output_path = matches.get_one::<String>("output");
        let in_place = matches.get_flag("in-place");
        let format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("binary") => Format::Binary,
            _ => Format::Xml,
        };

        if in_place && input_path == "-" {
            return Err(PlistError::InvalidArguments(
                "Cannot use -i option with stdin input".to_string(),
            ));
        }

        let output_path = match output_path {
            Some(path) => path.clone(),
            None => {
                if in_place {
                    input_path.clone()
                } else {
                    "-".to_string()
                }
            }
        };

        match (input_path.as_str(), output_path.as_str()) {
            ("-", "-") => Converter::convert_stdin_stdout(format),
            ("-", output) => Converter::convert_stdin_to_file(output, format),
            (input, "-") => Converter::convert_file_to_stdout(input, format),
            (input, output) => Converter::convert_file(input, output, format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command() {
        let cmd = Cli::build_command();
        assert_eq!(cmd.get_name(), "plistconv");
    }

    #[test]
    fn test_format_defaults_to_xml() {
        let matches = Cli::build_command()
            .try_get_matches_from(vec!["plistconv", "input.plist"])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("format").map(String::as_str),
            Some("xml")
        );
    }

    #[test]
    fn test_rejects_unknown_format() {
        let result = Cli::build_command()
            .try_get_matches_from(vec!["plistconv", "-f", "ascii", "input.plist"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_in_place_with_stdin_error() {
        let matches = Cli::build_command()
            .try_get_matches_from(vec!["plistconv", "-i", "-"])
            .unwrap();

        let result = Cli::run_with_matches(matches);
        assert!(result.is_err());

        if let Err(PlistError::InvalidArguments(msg)) = result {
            assert!(msg.contains("Cannot use -i option with stdin input"));
        } else {
            panic!("Expected InvalidArguments");
        }
    }
}

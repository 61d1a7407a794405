use clap::Parser;

use super::*;

#[test]
fn parses_flyers_command() {
    let cli = Cli::try_parse_from(["prospekt-cli", "flyers", "--retailer", "lidl"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::Flyers { ref retailer } if retailer == "lidl"
    ));
}

#[test]
fn detect_defaults_to_first_flyer_and_configured_confidence() {
    let cli = Cli::try_parse_from(["prospekt-cli", "detect", "--retailer", "lidl"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::Detect {
            ordinal: 1,
            confidence: None,
            ..
        }
    ));
}

#[test]
fn detect_accepts_ordinal_and_confidence() {
    let cli = Cli::try_parse_from([
        "prospekt-cli",
        "detect",
        "--retailer",
        "angebote",
        "--ordinal",
        "2",
        "--confidence",
        "0.3",
    ])
    .expect("expected valid cli args");
    match cli.command {
        Commands::Detect {
            retailer,
            ordinal,
            confidence,
        } => {
            assert_eq!(retailer, "angebote");
            assert_eq!(ordinal, 2);
            assert_eq!(confidence, Some(0.3));
        }
        Commands::Flyers { .. } => panic!("expected detect"),
    }
}

#[test]
fn retailer_is_required() {
    assert!(Cli::try_parse_from(["prospekt-cli", "detect"]).is_err());
}

#[test]
fn missing_subcommand_is_an_error() {
    assert!(Cli::try_parse_from(["prospekt-cli"]).is_err());
}

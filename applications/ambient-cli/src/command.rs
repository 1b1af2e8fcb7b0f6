/// Line-oriented command parsing
use crate::error::CliError;
use ambient_mixer::FadeCurve;
use std::str::FromStr;

/// Track addressed by id or by hotkey digit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(String),
    Hotkey(u8),
}

/// One interactive command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Flip one track on or off
    Toggle(Target),
    /// Enable a track
    On(String),
    /// Disable a track
    Off(String),
    /// Set a track's volume
    Volume { id: String, volume: f32 },
    /// Set the master volume
    Master(f32),
    /// Set the crossfade duration in seconds
    Fade(f32),
    /// Set the ramp shape
    Curve(FadeCurve),
    /// Pause everything that plays, or bring back what was paused
    All,
    /// Silence everything and forget the paused set
    Stop,
    /// Save the current mix; `overwrite` replaces an existing preset
    Save { name: String, overwrite: bool },
    /// Apply a preset
    Load(String),
    /// Apply the preset after the current one
    Next,
    /// Remove a preset
    Delete(String),
    /// List presets
    Presets,
    /// Print the mixer state
    Status,
    /// Print the current mix as JSON
    Dump,
    /// Start audio if the output is suspended
    Resume,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  <digit> | toggle <id|digit>   flip a track on/off
  on <id> | off <id>            enable / disable a track
  vol <id> <0..1>               track volume
  master <0..1>                 master volume
  fade <secs>                   crossfade duration (0-10)
  curve linear|equal            crossfade shape
  all                           pause all / restore paused
  stop                          stop everything
  save <name> [!]               save preset (! overwrites)
  load <name> | next            apply a preset
  delete <name>                 remove a preset
  presets | status | dump       show presets / state / JSON
  resume                        start suspended audio
  help | quit";

impl FromStr for Command {
    type Err = CliError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(CliError::Command("empty line".into()));
        };
        let rest: Vec<&str> = words.collect();

        // A bare digit is the hotkey itself
        if let Some(digit) = parse_digit(head) {
            if rest.is_empty() {
                return Ok(Command::Toggle(Target::Hotkey(digit)));
            }
        }

        let command = match (head.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("toggle" | "t", [target]) => Command::Toggle(
                parse_digit(target).map_or_else(|| Target::Id((*target).to_string()), Target::Hotkey),
            ),
            ("on", [id]) => Command::On((*id).to_string()),
            ("off", [id]) => Command::Off((*id).to_string()),
            ("vol" | "volume", [id, value]) => Command::Volume {
                id: (*id).to_string(),
                volume: parse_number(value)?,
            },
            ("master", [value]) => Command::Master(parse_number(value)?),
            ("fade" | "crossfade", [value]) => Command::Fade(parse_number(value)?),
            ("curve", [shape]) => Command::Curve(match shape.to_ascii_lowercase().as_str() {
                "linear" => FadeCurve::Linear,
                "equal" | "equal_power" | "equal-power" => FadeCurve::EqualPower,
                other => return Err(CliError::Command(format!("unknown curve '{other}'"))),
            }),
            ("all", []) => Command::All,
            ("stop", []) => Command::Stop,
            ("save", [_, ..]) => {
                let (overwrite, words) = match rest.split_last() {
                    Some((&"!", words)) => (true, words),
                    _ => (false, rest.as_slice()),
                };
                let name = words.join(" ");
                if name.is_empty() {
                    return Err(CliError::Command("save needs a name".into()));
                }
                Command::Save { name, overwrite }
            }
            ("load", [_, ..]) => Command::Load(rest.join(" ")),
            ("next", []) => Command::Next,
            ("delete" | "rm", [_, ..]) => Command::Delete(rest.join(" ")),
            ("presets", []) => Command::Presets,
            ("status" | "s", []) => Command::Status,
            ("dump", []) => Command::Dump,
            ("resume", []) => Command::Resume,
            ("help" | "?", []) => Command::Help,
            ("quit" | "exit" | "q", []) => Command::Quit,
            (other, _) => {
                return Err(CliError::Command(format!(
                    "cannot parse '{other}' with {} argument(s)",
                    rest.len()
                )))
            }
        };

        Ok(command)
    }
}

fn parse_digit(word: &str) -> Option<u8> {
    match word.as_bytes() {
        [b @ b'0'..=b'9'] => Some(b - b'0'),
        _ => None,
    }
}

fn parse_number(word: &str) -> Result<f32, CliError> {
    word.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CliError::Command(format!("'{word}' is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        line.parse().unwrap()
    }

    #[test]
    fn test_bare_digit_is_hotkey() {
        assert_eq!(parse("3"), Command::Toggle(Target::Hotkey(3)));
        assert_eq!(parse("  5 "), Command::Toggle(Target::Hotkey(5)));
    }

    #[test]
    fn test_toggle_by_id_or_digit() {
        assert_eq!(parse("toggle rain"), Command::Toggle(Target::Id("rain".into())));
        assert_eq!(parse("toggle 2"), Command::Toggle(Target::Hotkey(2)));
        assert_eq!(parse("t fire"), Command::Toggle(Target::Id("fire".into())));
    }

    #[test]
    fn test_numeric_commands() {
        assert_eq!(
            parse("vol cafe 0.25"),
            Command::Volume {
                id: "cafe".into(),
                volume: 0.25
            }
        );
        assert_eq!(parse("master 1"), Command::Master(1.0));
        assert_eq!(parse("FADE 2.5"), Command::Fade(2.5));
    }

    #[test]
    fn test_numbers_must_be_finite() {
        assert!("master loud".parse::<Command>().is_err());
        assert!("master NaN".parse::<Command>().is_err());
        assert!("fade inf".parse::<Command>().is_err());
    }

    #[test]
    fn test_save_with_spaces_and_overwrite() {
        assert_eq!(
            parse("save Rainy Night"),
            Command::Save {
                name: "Rainy Night".into(),
                overwrite: false
            }
        );
        assert_eq!(
            parse("save Rainy Night !"),
            Command::Save {
                name: "Rainy Night".into(),
                overwrite: true
            }
        );
        assert!("save !".parse::<Command>().is_err());
    }

    #[test]
    fn test_preset_names_keep_spaces() {
        assert_eq!(parse("load Deep Focus"), Command::Load("Deep Focus".into()));
        assert_eq!(parse("delete Deep Focus"), Command::Delete("Deep Focus".into()));
    }

    #[test]
    fn test_curve_shapes() {
        assert_eq!(parse("curve linear"), Command::Curve(FadeCurve::Linear));
        assert_eq!(parse("curve equal"), Command::Curve(FadeCurve::EqualPower));
        assert!("curve cubic".parse::<Command>().is_err());
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        assert!("on".parse::<Command>().is_err());
        assert!("vol rain".parse::<Command>().is_err());
        assert!("stop now".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }
}

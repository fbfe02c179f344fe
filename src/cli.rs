use crate::config::AppConfigOverrides;
use crate::renderer::shadow_settings::{ShadowMode, ShadowResolution};
use anyhow::{anyhow, bail, Context, Result};
use std::env;

const SUPPORTED_FLAGS: &str = "--width, --height, --vsync, --shadow-mode, --shadow-resolution";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    width: Option<u32>,
    height: Option<u32>,
    vsync: Option<bool>,
    shadow_mode: Option<ShadowMode>,
    shadow_resolution: Option<ShadowResolution>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // program name
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Supported flags: {SUPPORTED_FLAGS}.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "vsync" => {
                    overrides.vsync = Some(parse_bool_flag("vsync", &value)?);
                }
                "shadow-mode" => {
                    overrides.shadow_mode = Some(parse_shadow_mode(&value)?);
                }
                "shadow-resolution" => {
                    let pixels =
                        value.parse::<u32>().with_context(|| format!("Invalid shadow resolution '{value}'"))?;
                    let resolution = ShadowResolution::from_pixels(pixels)
                        .ok_or_else(|| anyhow!("Unsupported shadow resolution {pixels}"))?;
                    overrides.shadow_resolution = Some(resolution);
                }
                _ => bail!("Unknown flag '{flag}'. Supported flags: {SUPPORTED_FLAGS}."),
            }
        }
        Ok(overrides)
    }

    pub fn into_config_overrides(self) -> AppConfigOverrides {
        AppConfigOverrides {
            width: self.width,
            height: self.height,
            vsync: self.vsync,
            shadow_mode: self.shadow_mode,
            shadow_resolution: self.shadow_resolution,
        }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

fn parse_shadow_mode(value: &str) -> Result<ShadowMode> {
    match value.to_ascii_lowercase().as_str() {
        "simple" => Ok(ShadowMode::Simple),
        "cascaded" | "csm" => Ok(ShadowMode::Cascaded),
        other => bail!("Invalid shadow mode '{other}'. Use simple or cascaded."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_window_flags() {
        let args = ["app", "--width", "1600", "--height", "900", "--vsync", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides").into_config_overrides();
        assert_eq!((overrides.width, overrides.height, overrides.vsync), (Some(1600), Some(900), Some(false)));
    }

    #[test]
    fn parses_shadow_flags() {
        let args = ["app", "--shadow-mode", "cascaded", "--shadow-resolution", "4096"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.shadow_mode, Some(ShadowMode::Cascaded));
        assert_eq!(overrides.shadow_resolution, Some(ShadowResolution::R4096));
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["app", "--width", "800", "--width", "1920", "--shadow-mode", "csm", "--shadow-mode", "simple"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.width, Some(1920));
        assert_eq!(overrides.shadow_mode, Some(ShadowMode::Simple));
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["app", "--width"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        let err = CliOverrides::parse(["app", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
        let err = CliOverrides::parse(["app", "--shadow-resolution", "1000"]).unwrap_err();
        assert!(err.to_string().contains("Unsupported shadow resolution"));
        assert!(CliOverrides::parse(["app", "--shadow-mode", "soft"]).is_err());
    }
}

//! Analysis settings and the configuration file.
//!
//! Settings select which analyses run and how: the probability approximation,
//! the mission time, Monte-Carlo trial counts, and SIL evaluation points.
//! Inconsistent combinations are rejected before any analysis starts.

use std::path::Path;

use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use faultline_mef::{Error, ErrorKind, Result};

/// Top-probability quantification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Approximation {
    /// Exact quantification over the binary decision diagram.
    Exact,
    /// Sum of product probabilities, clamped to 1.
    RareEvent,
    /// Min-cut upper bound.
    Mcub,
}

impl Approximation {
    pub fn parse(text: &str) -> Option<Approximation> {
        Some(match text {
            "exact" => Approximation::Exact,
            "rare-event" => Approximation::RareEvent,
            "mcub" => Approximation::Mcub,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Approximation::Exact => "exact",
            Approximation::RareEvent => "rare-event",
            Approximation::Mcub => "mcub",
        }
    }
}

/// All analysis knobs with their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Quantify the top-event probability.
    pub probability_analysis: bool,
    /// Compute per-event importance measures; implies probability analysis.
    pub importance_analysis: bool,
    /// Monte-Carlo uncertainty analysis over the sampling cycles.
    pub uncertainty_analysis: bool,
    /// Time-integrated PFDavg / PFH and the SIL band.
    pub sil_analysis: bool,
    /// Approximation for the top probability.
    pub approximation: Approximation,
    /// Mission time in hours.
    pub mission_time: f64,
    /// Number of Monte-Carlo trials.
    pub num_trials: u32,
    /// Seed for reproducible sampling cycles.
    pub seed: Option<u64>,
    /// Number of time points for SIL integration over [0, mission time].
    pub sil_time_points: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            probability_analysis: true,
            importance_analysis: false,
            uncertainty_analysis: false,
            sil_analysis: false,
            approximation: Approximation::Exact,
            mission_time: faultline_mef::model::DEFAULT_MISSION_TIME,
            num_trials: 10_000,
            seed: None,
            sil_time_points: 24,
        }
    }
}

impl Settings {
    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.mission_time < 0.0 {
            return Err(settings_error("mission time cannot be negative"));
        }
        if self.uncertainty_analysis && self.num_trials == 0 {
            return Err(settings_error(
                "uncertainty analysis requires at least one trial",
            ));
        }
        if self.sil_analysis && self.sil_time_points < 2 {
            return Err(settings_error(
                "SIL evaluation requires at least two time points",
            ));
        }
        if self.sil_analysis && self.mission_time <= 0.0 {
            return Err(settings_error(
                "SIL evaluation requires a positive mission time",
            ));
        }
        Ok(())
    }

    /// Loads settings from a `<faultline>` configuration document.
    pub fn from_config_file(path: &Path) -> Result<Settings> {
        let text = std::fs::read_to_string(path)?;
        Self::from_config_str(&text)
    }

    /// Parses the configuration document. Unknown elements are rejected so
    /// that typos do not silently disable analyses.
    pub fn from_config_str(text: &str) -> Result<Settings> {
        let mut settings = Settings::default();
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);
        let mut saw_root = false;
        loop {
            match reader.read_event() {
                Ok(XmlEvent::Start(ref e)) | Ok(XmlEvent::Empty(ref e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let mut attr = |key: &str| -> Result<Option<String>> {
                        for a in e.attributes().flatten() {
                            if a.key.as_ref() == key.as_bytes() {
                                let value = a
                                    .unescape_value()
                                    .map_err(|err| settings_error(&err.to_string()))?;
                                return Ok(Some(value.to_string()));
                            }
                        }
                        Ok(None)
                    };
                    match tag.as_str() {
                        "faultline" => saw_root = true,
                        "mission-time" => {
                            if let Some(value) = attr("value")? {
                                settings.mission_time = value.parse().map_err(|_| {
                                    settings_error(&format!("invalid mission time '{value}'"))
                                })?;
                            }
                        }
                        "probability" => {
                            settings.probability_analysis = true;
                            if let Some(value) = attr("approximation")? {
                                settings.approximation = Approximation::parse(&value)
                                    .ok_or_else(|| {
                                        settings_error(&format!(
                                            "unknown approximation '{value}'"
                                        ))
                                    })?;
                            }
                        }
                        "importance" => settings.importance_analysis = true,
                        "uncertainty" => {
                            settings.uncertainty_analysis = true;
                            if let Some(value) = attr("trials")? {
                                settings.num_trials = value.parse().map_err(|_| {
                                    settings_error(&format!("invalid trial count '{value}'"))
                                })?;
                            }
                            if let Some(value) = attr("seed")? {
                                settings.seed = Some(value.parse().map_err(|_| {
                                    settings_error(&format!("invalid seed '{value}'"))
                                })?);
                            }
                        }
                        "sil" => {
                            settings.sil_analysis = true;
                            if let Some(value) = attr("points")? {
                                settings.sil_time_points = value.parse().map_err(|_| {
                                    settings_error(&format!("invalid point count '{value}'"))
                                })?;
                            }
                        }
                        other => {
                            return Err(settings_error(&format!(
                                "unknown configuration element <{other}>"
                            )));
                        }
                    }
                }
                Ok(XmlEvent::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(settings_error(&err.to_string())),
            }
        }
        if !saw_root {
            return Err(settings_error(
                "configuration root element must be <faultline>",
            ));
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn settings_error(message: &str) -> Error {
    Error::new(ErrorKind::Settings(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn config_round_trip() {
        let text = r#"<faultline>
  <mission-time value="720"/>
  <probability approximation="rare-event"/>
  <importance/>
  <uncertainty trials="500" seed="42"/>
  <sil points="12"/>
</faultline>"#;
        let settings = Settings::from_config_str(text).unwrap();
        assert_eq!(settings.mission_time, 720.0);
        assert_eq!(settings.approximation, Approximation::RareEvent);
        assert!(settings.importance_analysis);
        assert_eq!(settings.num_trials, 500);
        assert_eq!(settings.seed, Some(42));
        assert_eq!(settings.sil_time_points, 12);
    }

    #[test]
    fn unknown_element_is_rejected() {
        let err = Settings::from_config_str("<faultline><num-sums/></faultline>").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Settings(_)));
    }

    #[test]
    fn unknown_approximation_is_rejected() {
        let err = Settings::from_config_str(
            r#"<faultline><probability approximation="magic"/></faultline>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Settings(_)));
    }

    #[test]
    fn zero_trials_with_uncertainty_is_inconsistent() {
        let mut settings = Settings::default();
        settings.uncertainty_analysis = true;
        settings.num_trials = 0;
        assert!(settings.validate().is_err());
    }
}

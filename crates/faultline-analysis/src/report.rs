//! XML report rendering.
//!
//! One document per run: for every analysed gate, the products, the top
//! probability, the importance table, the uncertainty bounds with the sample
//! histogram, and the SIL table.

use chrono::Utc;

use crate::analysis::GateAnalysis;

/// Renders the report document for one model run.
pub fn render(model_name: &str, results: &[GateAnalysis]) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<report model=\"{}\" generated=\"{}\">\n",
        escape_xml(model_name),
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    ));

    for result in results {
        xml.push_str(&format!(
            "  <fault-tree name=\"{}\" top-gate=\"{}\">\n",
            escape_xml(&result.tree),
            escape_xml(&result.gate)
        ));

        xml.push_str(&format!(
            "    <products count=\"{}\">\n",
            result.products.len()
        ));
        for product in &result.products {
            xml.push_str(&format!(
                "      <product order=\"{}\" probability=\"{:.6e}\">\n",
                product.order, product.probability
            ));
            for event in &product.events {
                xml.push_str(&format!(
                    "        <basic-event name=\"{}\"/>\n",
                    escape_xml(event)
                ));
            }
            xml.push_str("      </product>\n");
        }
        xml.push_str("    </products>\n");

        if let Some(probability) = &result.probability {
            xml.push_str(&format!(
                "    <probability value=\"{:.6e}\" approximation=\"{}\"/>\n",
                probability.value,
                probability.approximation.as_str()
            ));
        }

        if let Some(importance) = &result.importance {
            xml.push_str("    <importance>\n");
            for record in importance.values() {
                xml.push_str(&format!(
                    "      <event name=\"{}\" probability=\"{:.6e}\" FV=\"{:.6}\" \
                     MIF=\"{:.6e}\" CIF=\"{:.6}\" DIF=\"{:.6}\" RAW=\"{:.6}\" RRW=\"{}\"/>\n",
                    escape_xml(&record.event),
                    record.probability,
                    record.fussell_vesely,
                    record.birnbaum,
                    record.cif,
                    record.dif,
                    record.raw,
                    if record.rrw.is_finite() {
                        format!("{:.6}", record.rrw)
                    } else {
                        "inf".to_string()
                    }
                ));
            }
            xml.push_str("    </importance>\n");
        }

        if let Some(uncertainty) = &result.uncertainty {
            xml.push_str(&format!(
                "    <uncertainty trials=\"{}\" mean=\"{:.6e}\" std-dev=\"{:.6e}\" \
                 median=\"{:.6e}\" confidence=\"{}\" lower-bound=\"{:.6e}\" \
                 upper-bound=\"{:.6e}\">\n",
                uncertainty.trials,
                uncertainty.mean,
                uncertainty.std_dev,
                uncertainty.median,
                uncertainty.confidence_level,
                uncertainty.ci_lower,
                uncertainty.ci_upper
            ));
            xml.push_str("      <histogram>\n");
            for bin in &uncertainty.histogram {
                xml.push_str(&format!(
                    "        <bin lower=\"{:.6e}\" upper=\"{:.6e}\" count=\"{}\"/>\n",
                    bin.lower, bin.upper, bin.count
                ));
            }
            xml.push_str("      </histogram>\n");
            xml.push_str("    </uncertainty>\n");
        }

        if let Some(sil) = &result.sil {
            xml.push_str(&format!(
                "    <sil PFDavg=\"{:.6e}\" PFH=\"{:.6e}\" demand-band=\"{}\" \
                 continuous-band=\"{}\">\n",
                sil.pfd_avg,
                sil.pfh,
                band_name(sil.pfd_band),
                band_name(sil.pfh_band)
            ));
            for (t, q) in &sil.curve {
                xml.push_str(&format!(
                    "      <point time=\"{t}\" probability=\"{q:.6e}\"/>\n"
                ));
            }
            xml.push_str("    </sil>\n");
        }

        xml.push_str("  </fault-tree>\n");
    }

    xml.push_str("</report>\n");
    xml
}

fn band_name(band: Option<crate::sil::SilLevel>) -> &'static str {
    band.map(|level| level.as_str()).unwrap_or("none")
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis;
    use crate::settings::Settings;
    use faultline_mef::{parser, validator};

    #[test]
    fn report_contains_all_sections() {
        let text = r#"<opsa-mef name="demo">
  <define-fault-tree name="train">
    <define-gate name="top">
      <or>
        <basic-event name="a"/>
        <basic-event name="b"/>
      </or>
    </define-gate>
    <define-basic-event name="a"><float value="0.001"/></define-basic-event>
    <define-basic-event name="b"><float value="0.002"/></define-basic-event>
  </define-fault-tree>
</opsa-mef>"#;
        let model = parser::parse_model(text, "demo.xml").unwrap();
        validator::validate(&model).unwrap();
        let mut settings = Settings::default();
        settings.importance_analysis = true;
        settings.uncertainty_analysis = true;
        settings.num_trials = 100;
        settings.seed = Some(5);
        settings.sil_analysis = true;
        let results = analysis::analyze(&model, &settings).unwrap();
        let report = render("demo", &results);

        assert!(report.contains("<products"));
        assert!(report.contains("<probability"));
        assert!(report.contains("<importance"));
        assert!(report.contains("<uncertainty"));
        assert!(report.contains("<sil"));
        assert!(report.contains("fault-tree name=\"train\""));
    }

    #[test]
    fn special_characters_are_escaped() {
        assert_eq!(escape_xml("a<b&c"), "a&lt;b&amp;c");
    }
}

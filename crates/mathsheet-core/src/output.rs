//! Cell output contract.
//!
//! Every evaluation produces exactly one [`Outcome`] (or one error), delivered
//! to an [`OutputSink`] supplied by the front end.

use mathsheet_engine::plot::PlotConfig;
use serde::{Deserialize, Serialize};

/// Successful result of one evaluation.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Text(String),
    Image(String),
    Plot(PlotConfig),
}

impl Outcome {
    pub fn text(s: impl Into<String>) -> Self {
        Outcome::Text(s.into())
    }

    pub fn deliver(self, sink: &mut dyn OutputSink) {
        match self {
            Outcome::Text(s) => sink.text(&s),
            Outcome::Image(url) => sink.image(&url),
            Outcome::Plot(config) => sink.plot(config),
        }
    }
}

/// Receiver for evaluation results.
pub trait OutputSink {
    fn text(&mut self, text: &str);
    fn image(&mut self, url: &str);
    fn plot(&mut self, config: PlotConfig);

    fn error(&mut self, message: &str) {
        self.text(&format!("[Error]: {}", message));
    }
}

/// Recorded output of one cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CellOutput {
    #[default]
    Empty,
    Text(String),
    Image(String),
    Plot(PlotConfig),
    Error(String),
}

impl CellOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, CellOutput::Error(_))
    }

    /// Text rendering; plots are summarized by their functions and range.
    pub fn display_text(&self) -> String {
        match self {
            CellOutput::Empty => String::new(),
            CellOutput::Text(s) | CellOutput::Image(s) => s.clone(),
            CellOutput::Plot(config) => format!(
                "[Plot: {} from {} to {}]",
                config.functions.join(", "),
                mathsheet_engine::engine::format_number(config.x_min),
                mathsheet_engine::engine::format_number(config.x_max)
            ),
            CellOutput::Error(message) => format!("[Error]: {}", message),
        }
    }
}

impl OutputSink for CellOutput {
    fn text(&mut self, text: &str) {
        *self = CellOutput::Text(text.to_string());
    }

    fn image(&mut self, url: &str) {
        *self = CellOutput::Image(url.to_string());
    }

    fn plot(&mut self, config: PlotConfig) {
        *self = CellOutput::Plot(config);
    }

    fn error(&mut self, message: &str) {
        *self = CellOutput::Error(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lines(Vec<String>);

    impl OutputSink for Lines {
        fn text(&mut self, text: &str) {
            self.0.push(text.to_string());
        }
        fn image(&mut self, url: &str) {
            self.0.push(format!("image {}", url));
        }
        fn plot(&mut self, config: PlotConfig) {
            self.0.push(format!("plot {}", config.functions.join(",")));
        }
    }

    #[test]
    fn test_default_error_goes_through_text() {
        let mut sink = Lines(Vec::new());
        sink.error("boom");
        assert_eq!(sink.0, vec!["[Error]: boom"]);
    }

    #[test]
    fn test_cell_output_records_last_delivery() {
        let mut out = CellOutput::default();
        Outcome::text("42").deliver(&mut out);
        assert_eq!(out, CellOutput::Text("42".to_string()));
        out.error("bad");
        assert!(out.is_error());
        assert_eq!(out.display_text(), "[Error]: bad");
    }

    #[test]
    fn test_cell_output_json_shape() {
        let json = serde_json::to_string(&CellOutput::Text("1".into())).unwrap();
        assert_eq!(json, r#"{"type":"text","value":"1"}"#);
        let back: CellOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CellOutput::Text("1".into()));
    }
}

//! The one [`Configurator`] this crate ships: params for [`SerialAdapter`]
//! (currently just its line-ending policy — the connection target itself is
//! part of the out-of-scope concrete [`crate::Channel`]).

use labcore_object::{Category, Configurator, FieldSpec, FieldValue, Params};

pub struct SerialAdapterConfigurator;

impl Configurator for SerialAdapterConfigurator {
    fn category(&self) -> Category {
        Category::HardwareAdapter
    }

    fn name(&self) -> &str {
        "SerialAdapter"
    }

    fn make_params(&self) -> Params {
        Params::new(vec![
            FieldSpec::new(
                "line_ending",
                "Line ending",
                FieldValue::Enum("LF".to_string()),
            )
            .with_description("Terminator appended to writes and scanned for on reads")
            .with_allowed_values(vec![
                "None".to_string(),
                "NUL".to_string(),
                "LF".to_string(),
                "CRLF".to_string(),
                "CR".to_string(),
            ]),
        ])
    }
}

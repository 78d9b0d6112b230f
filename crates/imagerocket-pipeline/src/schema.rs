//! Property schemas describing a node's configuration.
//!
//! A schema lists the properties a node keeps in its model, how a host
//! should edit them, and which of them belong in the serialized form. It
//! serializes to the JSON shape editors consume:
//!
//! ```json
//! { "properties": [
//!     { "name": "expand", "editor": "exponentialSlider", "label": "Border width",
//!       "expOffset": 1, "expMin": 0, "expMax": 64 },
//!     { "name": "lastX", "editor": "int?", "label": "Last X",
//!       "readOnly": true, "serializable": false }
//! ] }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The widget family used to edit a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorKind {
    /// Integer input.
    Int,
    /// Floating-point input.
    Double,
    /// Checkbox.
    Boolean,
    /// Color picker over a packed pixel.
    Color,
    /// Integer slider with an exponential mapping.
    ExponentialSlider,
    /// Ordered list of child nodes.
    ProcessNodeList,
}

impl EditorKind {
    /// The editor name as it appears in a schema document.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Color => "color",
            Self::ExponentialSlider => "exponentialSlider",
            Self::ProcessNodeList => "processNode[]",
        }
    }
}

/// An editor kind plus whether the value may be null.
///
/// Written as the kind name with a trailing `?` when optional, e.g.
/// `"int?"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EditorType {
    /// Widget family.
    pub kind: EditorKind,
    /// Whether null is a valid value.
    pub optional: bool,
}

impl EditorType {
    /// A required value edited with `kind`.
    #[must_use]
    pub const fn required(kind: EditorKind) -> Self {
        Self {
            kind,
            optional: false,
        }
    }

    /// A nullable value edited with `kind`.
    #[must_use]
    pub const fn optional(kind: EditorKind) -> Self {
        Self {
            kind,
            optional: true,
        }
    }
}

impl fmt::Display for EditorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        if self.optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// An editor name that matches no [`EditorKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown editor type: {0:?}")]
pub struct UnknownEditor(pub String);

impl FromStr for EditorType {
    type Err = UnknownEditor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, optional) = s.strip_suffix('?').map_or((s, false), |n| (n, true));
        let kind = match name {
            "int" => EditorKind::Int,
            "double" => EditorKind::Double,
            "boolean" => EditorKind::Boolean,
            "color" => EditorKind::Color,
            "exponentialSlider" => EditorKind::ExponentialSlider,
            "processNode[]" => EditorKind::ProcessNodeList,
            _ => return Err(UnknownEditor(s.to_owned())),
        };
        Ok(Self { kind, optional })
    }
}

impl TryFrom<String> for EditorType {
    type Error = UnknownEditor;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EditorType> for String {
    fn from(editor: EditorType) -> Self {
        editor.to_string()
    }
}

const fn is_false(b: &bool) -> bool {
    !*b
}

const fn is_true(b: &bool) -> bool {
    *b
}

const fn default_true() -> bool {
    true
}

/// One configurable property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    /// Key in the node's model.
    pub name: String,

    /// How the property is edited.
    pub editor: EditorType,

    /// Human-readable label.
    #[serde(default)]
    pub label: String,

    /// Lower bound for numeric editors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Upper bound for numeric editors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Step for numeric editors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,

    /// Displayed but not editable; the node writes it itself.
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_only: bool,

    /// Included in the node's serialized record.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub serializable: bool,

    /// Color editors expose the alpha channel.
    #[serde(default, skip_serializing_if = "is_false")]
    pub alpha: bool,

    /// Exponential slider: value added before taking the logarithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_offset: Option<f64>,

    /// Exponential slider: smallest value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_min: Option<f64>,

    /// Exponential slider: largest value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_max: Option<f64>,
}

impl PropertySchema {
    /// A required, serializable property.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EditorKind, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            editor: EditorType::required(kind),
            label: label.into(),
            min: None,
            max: None,
            step: None,
            read_only: false,
            serializable: true,
            alpha: false,
            exp_offset: None,
            exp_min: None,
            exp_max: None,
        }
    }

    /// Mark the value nullable.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.editor.optional = true;
        self
    }

    /// Mark the property as written only by its node.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Leave the property out of serialized records.
    #[must_use]
    pub const fn transient(mut self) -> Self {
        self.serializable = false;
        self
    }

    /// Numeric bounds.
    #[must_use]
    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Numeric step.
    #[must_use]
    pub const fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Expose the alpha channel in color editors.
    #[must_use]
    pub const fn with_alpha(mut self) -> Self {
        self.alpha = true;
        self
    }

    /// Exponential slider mapping.
    #[must_use]
    pub const fn exponential(mut self, offset: f64, min: f64, max: f64) -> Self {
        self.exp_offset = Some(offset);
        self.exp_min = Some(min);
        self.exp_max = Some(max);
        self
    }
}

/// The full property list of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Properties in display order.
    pub properties: Vec<PropertySchema>,
}

impl Schema {
    /// A schema over the given properties.
    #[must_use]
    pub const fn new(properties: Vec<PropertySchema>) -> Self {
        Self { properties }
    }

    /// Look up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Names of the properties that belong in serialized records, in
    /// schema order.
    pub fn serializable_names(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|p| p.serializable)
            .map(|p| p.name.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn editor_type_parses_optional_marker() {
        let editor: EditorType = "int?".parse().unwrap();
        assert_eq!(editor, EditorType::optional(EditorKind::Int));
        let editor: EditorType = "processNode[]".parse().unwrap();
        assert_eq!(editor, EditorType::required(EditorKind::ProcessNodeList));
        assert!("slider".parse::<EditorType>().is_err());
    }

    #[test]
    fn property_serializes_to_editor_shape() {
        let prop = PropertySchema::new("lastColor", EditorKind::Color, "Last border color")
            .optional()
            .read_only()
            .transient()
            .with_alpha();
        assert_eq!(
            serde_json::to_value(&prop).unwrap(),
            json!({
                "name": "lastColor",
                "editor": "color?",
                "label": "Last border color",
                "readOnly": true,
                "serializable": false,
                "alpha": true,
            })
        );
    }

    #[test]
    fn serializable_defaults_to_true() {
        let schema: Schema = serde_json::from_value(json!({
            "properties": [
                { "name": "expand", "editor": "exponentialSlider",
                  "expOffset": 1, "expMin": 0, "expMax": 64 },
                { "name": "lastX", "editor": "int?", "serializable": false },
            ]
        }))
        .unwrap();
        let names: Vec<_> = schema.serializable_names().collect();
        assert_eq!(names, ["expand"]);
        assert_eq!(schema.property("expand").unwrap().exp_max, Some(64.0));
    }
}

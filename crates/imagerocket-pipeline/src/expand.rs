//! Crop rectangle expansion.

use crate::buffer::PixelBuffer;
use crate::model::ModelBridge;
use crate::node::{Features, Node, NodeClass, NodeFeature, NodeGraph, NodeId};
use crate::schema::{EditorKind, PropertySchema, Schema};
use crate::types::{PipelineError, Rect, SideAmounts};
use crate::value::{Record, Value};

/// One side of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Left edge.
    Left,
    /// Top edge.
    Top,
    /// Right edge.
    Right,
    /// Bottom edge.
    Bottom,
}

impl Side {
    /// All sides in rectangle order.
    pub const ALL: [Self; 4] = [Self::Left, Self::Top, Self::Right, Self::Bottom];

    /// Name of the model property overriding this side.
    #[must_use]
    pub const fn override_property(self) -> &'static str {
        match self {
            Self::Left => "overrideLeft",
            Self::Top => "overrideTop",
            Self::Right => "overrideRight",
            Self::Bottom => "overrideBottom",
        }
    }
}

/// Grow `rect` outward by `amounts`. The result may extend past the
/// buffer on any side.
#[must_use]
pub const fn expand_rect(rect: Rect, amounts: SideAmounts) -> Rect {
    rect.expanded(amounts)
}

/// Enlarges the crop rectangle by a border.
///
/// `expand` applies to every side unless the side's override
/// (`overrideLeft`, `overrideTop`, `overrideRight`, `overrideBottom`) is
/// set. The result is stored as the buffer's expanded rectangle.
#[derive(Debug)]
pub struct SimpleExpander {
    id: NodeId,
    bridge: ModelBridge,
}

impl SimpleExpander {
    /// Base expansion applied to every side without an override.
    #[must_use]
    pub fn expand_by(&self) -> i64 {
        self.bridge.get("expand").as_i64().unwrap_or(0)
    }

    /// Set the base expansion.
    pub fn set_expand_by(&self, amount: i64) {
        self.bridge.model().set("expand", amount);
    }

    /// The override for `side`, if set.
    #[must_use]
    pub fn override_for(&self, side: Side) -> Option<i64> {
        self.bridge.get(side.override_property()).as_i64()
    }

    /// Set or clear the override for `side`.
    pub fn set_override(&self, side: Side, amount: Option<i64>) {
        self.bridge.model().set(side.override_property(), amount);
    }

    /// The amount each side will actually move.
    #[must_use]
    pub fn effective_expansion(&self) -> SideAmounts {
        let base = self.expand_by();
        let amount = |side| self.override_for(side).unwrap_or(base);
        SideAmounts {
            left: amount(Side::Left),
            top: amount(Side::Top),
            right: amount(Side::Right),
            bottom: amount(Side::Bottom),
        }
    }
}

impl Default for SimpleExpander {
    fn default() -> Self {
        let mut properties = vec![
            PropertySchema::new("expand", EditorKind::ExponentialSlider, "Border width")
                .exponential(1.0, 0.0, 64.0),
        ];
        let mut initial = Record::new().with("expand", 0);
        for (side, label) in Side::ALL.into_iter().zip(["Left", "Top", "Right", "Bottom"]) {
            properties.push(
                PropertySchema::new(side.override_property(), EditorKind::Int, label).optional(),
            );
            initial.insert(side.override_property(), Value::Null);
        }
        Self {
            id: NodeId::next(),
            bridge: ModelBridge::new(initial, Schema::new(properties)),
        }
    }
}

impl Node for SimpleExpander {
    fn id(&self) -> NodeId {
        self.id
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn serialize(&self) -> Record {
        self.bridge.export_to_model()
    }

    fn deserialize(&mut self, record: &Record) {
        self.bridge.patch_model(record);
    }

    fn model_bridge(&self) -> Option<ModelBridge> {
        Some(self.bridge.pair())
    }

    fn features(&self) -> Features {
        if self.effective_expansion().is_zero() {
            Features::from([NodeFeature::NoEffect])
        } else {
            Features::new()
        }
    }

    fn process_image(
        &self,
        _graph: &NodeGraph,
        mut buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError> {
        let amounts = self.effective_expansion();
        let params = buffer.crop_parameters_mut();
        let crop = params.crop_rect();
        let expanded = if amounts.is_zero() {
            crop
        } else {
            expand_rect(crop, amounts)
        };
        tracing::debug!(%crop, %expanded, "expanded crop rectangle");
        params.set_expanded_rect(expanded);
        Ok(buffer)
    }
}

impl NodeClass for SimpleExpander {
    const CLASS_NAME: &'static str = "SimpleExpander";
}

// SPDX-License-Identifier: MIT

//! Static catalogue of node types
//!
//! The engine only reads `inputs`/`outputs` (to route handle-less edges);
//! the remaining fields describe the node to the editor UI.

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};

use super::types::NodeKind;

#[derive(Debug, Clone, Serialize)]
pub struct NodeDescriptor {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: &'static str,
    pub category: &'static str,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
    pub properties: Value,
}

static DESCRIPTORS: Lazy<Vec<NodeDescriptor>> = Lazy::new(|| {
    vec![
        NodeDescriptor {
            kind: NodeKind::ImageInput,
            name: "Image Input",
            category: "input",
            inputs: &[],
            outputs: &["image"],
            properties: json!({
                "source_type": {"type": "select", "options": ["upload", "url"], "default": "upload"},
                "url": {"type": "text", "condition": "source_type=url"},
                "file": {"type": "file", "condition": "source_type=upload"}
            }),
        },
        NodeDescriptor {
            kind: NodeKind::TextToImage,
            name: "Text to Image",
            category: "generation",
            inputs: &["prompt"],
            outputs: &["image"],
            properties: json!({
                "provider": {"type": "select", "options": ["openai", "fal", "stability"]},
                "model": {"type": "select", "dynamic": true},
                "prompt": {"type": "textarea"},
                "width": {"type": "number", "default": 1024},
                "height": {"type": "number", "default": 1024},
                "steps": {"type": "number", "default": 30},
                "guidance_scale": {"type": "number", "default": 7.5}
            }),
        },
        NodeDescriptor {
            kind: NodeKind::ImageToImage,
            name: "Image to Image",
            category: "generation",
            inputs: &["image", "prompt"],
            outputs: &["image"],
            properties: json!({
                "provider": {"type": "select", "options": ["openai", "fal", "stability"]},
                "model": {"type": "select", "dynamic": true},
                "prompt": {"type": "textarea"},
                "strength": {"type": "slider", "min": 0, "max": 1, "default": 0.8}
            }),
        },
        NodeDescriptor {
            kind: NodeKind::StyleTransfer,
            name: "Style Transfer",
            category: "transformation",
            inputs: &["image"],
            outputs: &["image"],
            properties: json!({
                "style": {"type": "select", "options": ["vintage", "neon", "watercolor", "oil_painting"]},
                "intensity": {"type": "slider", "min": 0, "max": 1, "default": 0.7}
            }),
        },
        NodeDescriptor {
            kind: NodeKind::TextOverlay,
            name: "Text Overlay",
            category: "manipulation",
            inputs: &["image"],
            outputs: &["image"],
            properties: json!({
                "text": {"type": "text"},
                "position": {"type": "select", "options": ["top", "center", "bottom"], "default": "center"},
                "font_size": {"type": "number", "default": 32, "min": 1, "max": 512},
                "font_color": {"type": "color", "default": "#ffffff"},
                "background_color": {"type": "color", "default": "transparent"}
            }),
        },
        NodeDescriptor {
            kind: NodeKind::CropResize,
            name: "Crop & Resize",
            category: "manipulation",
            inputs: &["image"],
            outputs: &["image"],
            properties: json!({
                "width": {"type": "number"},
                "height": {"type": "number"},
                "crop_type": {
                    "type": "select",
                    "options": ["center_crop", "smart_crop", "resize_only"],
                    "default": "resize_only"
                }
            }),
        },
        NodeDescriptor {
            kind: NodeKind::Output,
            name: "Output",
            category: "output",
            inputs: &["image"],
            outputs: &[],
            properties: json!({
                "format": {"type": "select", "options": ["png", "jpg", "webp", "gif", "bmp", "tiff"], "default": "png"},
                "quality": {"type": "slider", "min": 1, "max": 100, "default": 90}
            }),
        },
    ]
});

/// Every known node type, in catalogue order
pub fn descriptors() -> &'static [NodeDescriptor] {
    &DESCRIPTORS
}

/// Descriptor for `kind`; `None` for passthrough types
pub fn descriptor(kind: &NodeKind) -> Option<&'static NodeDescriptor> {
    DESCRIPTORS.iter().find(|d| &d.kind == kind)
}

/// Declared input names for `kind`, empty when unknown
pub fn inputs_of(kind: &NodeKind) -> &'static [&'static str] {
    descriptor(kind).map(|d| d.inputs).unwrap_or(&[])
}

/// Catalogue as served to the editor: `{type: {name, category, inputs, outputs, properties}}`
pub fn catalogue() -> Value {
    let entries = DESCRIPTORS
        .iter()
        .map(|d| {
            (
                d.kind.to_string(),
                json!({
                    "name": d.name,
                    "category": d.category,
                    "inputs": d.inputs,
                    "outputs": d.outputs,
                    "properties": d.properties,
                }),
            )
        })
        .collect::<serde_json::Map<_, _>>();
    Value::Object(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_kind_has_descriptor() {
        for kind in NodeKind::KNOWN.iter() {
            assert!(descriptor(kind).is_some(), "missing {}", kind);
        }
        assert!(descriptor(&NodeKind::Other("blur".into())).is_none());
    }

    #[test]
    fn test_io_table() {
        assert!(inputs_of(&NodeKind::ImageInput).is_empty());
        assert_eq!(inputs_of(&NodeKind::TextToImage), &["prompt"]);
        assert_eq!(inputs_of(&NodeKind::ImageToImage), &["image", "prompt"]);
        assert_eq!(inputs_of(&NodeKind::Output), &["image"]);
        assert!(descriptor(&NodeKind::Output).unwrap().outputs.is_empty());
        assert!(inputs_of(&NodeKind::Other("blur".into())).is_empty());
    }

    #[test]
    fn test_catalogue_shape() {
        let catalogue = catalogue();
        assert_eq!(catalogue.as_object().unwrap().len(), 7);
        assert_eq!(catalogue["crop_resize"]["name"], "Crop & Resize");
        assert_eq!(catalogue["output"]["properties"]["quality"]["default"], 90);
        assert_eq!(catalogue["image_input"]["outputs"][0], "image");
    }
}

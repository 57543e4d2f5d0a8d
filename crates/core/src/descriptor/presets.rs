//! Built-in endpoint sets for well-known provider APIs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{EndpointDescriptor, EndpointSet, HttpMethod, ParamField, ParamKind};

/// Named endpoint presets selectable from provider configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointPreset {
    /// Sora-compatible video generation API.
    Sora,
}

impl EndpointPreset {
    pub fn endpoints(&self) -> EndpointSet {
        match self {
            EndpointPreset::Sora => sora_endpoints(),
        }
    }
}

fn select(key: &str, label: &str, options: Vec<Value>, default: Value) -> ParamField {
    ParamField::new(key, ParamKind::Select { options }, default).with_label(label)
}

fn flag(key: &str, label: &str) -> ParamField {
    ParamField::new(key, ParamKind::Boolean, json!(false)).with_label(label)
}

fn sora_endpoints() -> EndpointSet {
    let generate = EndpointDescriptor::new(HttpMethod::Post, "/videos/generations")
        .with_param(
            select(
                "model",
                "Model",
                vec![json!("sora-2"), json!("sora-2-pro"), json!("sora-2-vip")],
                json!("sora-2"),
            )
            .required(),
        )
        .with_param(select(
            "duration",
            "Duration (s)",
            vec![json!(10), json!(15), json!(25)],
            json!(10),
        ))
        .with_param(select(
            "aspect_ratio",
            "Aspect ratio",
            vec![json!("16:9"), json!("9:16")],
            json!("16:9"),
        ))
        .with_param(
            ParamField::new("thumbnail", ParamKind::Boolean, json!(true)).with_label("Thumbnail"),
        )
        .with_param(select(
            "metadata.n",
            "Variants",
            vec![json!(1), json!(2), json!(3), json!(4)],
            json!(1),
        ))
        .with_param(flag("metadata.watermark", "Watermark"))
        .with_param(flag("metadata.hd", "HD"))
        .with_param(flag("metadata.private", "Private"))
        .with_param(
            flag("metadata.storyboard", "Storyboard")
                .with_remark("split the prompt into timed shots"),
        )
        .with_param(select(
            "metadata.style",
            "Style",
            vec![
                json!(""),
                json!("anime"),
                json!("comic"),
                json!("news"),
                json!("selfie"),
                json!("nostalgic"),
                json!("thanksgiving"),
            ],
            json!(""),
        ))
        .with_mapping("taskId", "id");

    let poll_status = EndpointDescriptor::new(HttpMethod::Get, "/videos/{taskId}")
        .with_mapping("status", "status")
        .with_mapping("videoUrl", "output.video_url")
        .with_mapping("thumbnailUrl", "output.thumbnail_url");

    let upload = EndpointDescriptor::new(HttpMethod::Post, "/uploads")
        .with_param(ParamField::new("file", ParamKind::File, Value::Null).required())
        .with_mapping("imageUrl", "url");

    EndpointSet {
        generate,
        poll_status,
        upload: Some(upload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::validate_endpoint_set;

    #[test]
    fn test_sora_preset_is_valid() {
        let set = EndpointPreset::Sora.endpoints();
        validate_endpoint_set(&set).unwrap();
        assert!(set.upload.as_ref().unwrap().is_multipart());
        assert_eq!(set.generate.mapping("taskId").unwrap().path, "id");
    }

    #[test]
    fn test_preset_name_deserializes() {
        let preset: EndpointPreset = serde_json::from_value(json!("sora")).unwrap();
        assert_eq!(preset, EndpointPreset::Sora);
    }
}

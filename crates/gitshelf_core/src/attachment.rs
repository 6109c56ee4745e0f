//! Attachment fields stored as sidecar files.
//!
//! A collection may designate some document fields as attachments. Their
//! values are kept out of `_item.json` and written next to it as
//! `<field>.<extension>`, so large text or binary blobs stay diffable and do
//! not bloat the canonical document.

use crate::collection::ITEM_FILE;
use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How an attachment value maps to sidecar bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentEncoding {
    /// The in-memory string is written as UTF-8.
    #[default]
    Text,
    /// The in-memory string is base64; the sidecar holds the decoded bytes.
    Base64,
}

/// Configuration of one attachment field.
///
/// Written either as a bare extension (`"md"`) or as
/// `{ "extension": "png", "encoding": "base64" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachmentSpec {
    /// Text attachment with the given file extension.
    Extension(String),
    /// Attachment with an explicit encoding.
    Detailed {
        /// File extension of the sidecar.
        extension: String,
        /// Encoding of the in-memory value.
        #[serde(default)]
        encoding: AttachmentEncoding,
    },
}

impl AttachmentSpec {
    /// Returns the sidecar file extension.
    pub fn extension(&self) -> &str {
        match self {
            AttachmentSpec::Extension(extension) => extension,
            AttachmentSpec::Detailed { extension, .. } => extension,
        }
    }

    /// Returns the value encoding.
    pub fn encoding(&self) -> AttachmentEncoding {
        match self {
            AttachmentSpec::Extension(_) => AttachmentEncoding::Text,
            AttachmentSpec::Detailed { encoding, .. } => *encoding,
        }
    }
}

/// Content of one attachment, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    /// Attachment field name.
    pub field: String,
    /// File name inside the item directory.
    pub file_name: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

/// Maps configured attachment fields to sidecar files and back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachmentCodec {
    fields: BTreeMap<String, AttachmentSpec>,
}

impl AttachmentCodec {
    /// Creates a codec for the given field configuration.
    pub fn new(fields: BTreeMap<String, AttachmentSpec>) -> Self {
        Self { fields }
    }

    /// Checks that every sidecar lands inside the item directory without
    /// replacing the canonical item file.
    pub fn validate(&self) -> CoreResult<()> {
        for (field, spec) in &self.fields {
            let extension = spec.extension();
            if field.is_empty() || extension.is_empty() {
                return Err(CoreError::attachment(field, "field and extension must be non-empty"));
            }
            if [field.as_str(), extension]
                .iter()
                .any(|part| part.contains(['/', '\\']) || *part == "..")
            {
                return Err(CoreError::attachment(
                    field,
                    "field and extension must not contain path separators",
                ));
            }
            if format!("{field}.{extension}") == ITEM_FILE {
                return Err(CoreError::attachment(
                    field,
                    format!("sidecar would replace {ITEM_FILE}"),
                ));
            }
        }
        Ok(())
    }

    /// Returns true if no attachment fields are configured.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the configured field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the sidecar file name for `field`, if it is an attachment.
    pub fn file_name(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)
            .map(|spec| format!("{field}.{}", spec.extension()))
    }

    /// Checks that every attachment present on `document` can be encoded.
    pub fn check(&self, document: &Value) -> CoreResult<()> {
        for (field, spec) in &self.fields {
            if let Some(value) = document.get(field) {
                encode_value(field, spec, value)?;
            }
        }
        Ok(())
    }

    /// Splits `document` into its canonical part and its sidecars.
    ///
    /// Attachment fields absent from the document produce no sidecar.
    pub fn split(&self, document: &Value) -> CoreResult<(Value, Vec<Sidecar>)> {
        let mut canonical = document.clone();
        let mut sidecars = Vec::new();
        if let Value::Object(fields) = &mut canonical {
            for (field, spec) in &self.fields {
                if let Some(value) = fields.remove(field) {
                    sidecars.push(Sidecar {
                        field: field.clone(),
                        file_name: format!("{field}.{}", spec.extension()),
                        bytes: encode_value(field, spec, &value)?,
                    });
                }
            }
        }
        Ok((canonical, sidecars))
    }

    /// Decodes sidecar bytes back into the in-memory value of `field`.
    pub fn decode(&self, field: &str, bytes: Vec<u8>) -> CoreResult<Value> {
        let spec = self
            .fields
            .get(field)
            .ok_or_else(|| CoreError::attachment(field, "not an attachment field"))?;
        match spec.encoding() {
            AttachmentEncoding::Text => String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|_| CoreError::attachment(field, "sidecar is not valid UTF-8")),
            AttachmentEncoding::Base64 => Ok(Value::String(STANDARD.encode(bytes))),
        }
    }
}

fn encode_value(field: &str, spec: &AttachmentSpec, value: &Value) -> CoreResult<Vec<u8>> {
    let text = value
        .as_str()
        .ok_or_else(|| CoreError::attachment(field, "attachment values must be strings"))?;
    match spec.encoding() {
        AttachmentEncoding::Text => Ok(text.as_bytes().to_vec()),
        AttachmentEncoding::Base64 => STANDARD
            .decode(text)
            .map_err(|e| CoreError::attachment(field, format!("invalid base64: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> AttachmentCodec {
        let fields: BTreeMap<String, AttachmentSpec> = serde_json::from_value(json!({
            "bio": "md",
            "photo": { "extension": "png", "encoding": "base64" }
        }))
        .unwrap();
        AttachmentCodec::new(fields)
    }

    #[test]
    fn spec_forms_deserialize() {
        let codec = codec();
        assert_eq!(codec.file_name("bio").as_deref(), Some("bio.md"));
        assert_eq!(codec.file_name("photo").as_deref(), Some("photo.png"));
        assert_eq!(codec.file_name("name"), None);
    }

    #[test]
    fn split_removes_attachment_fields() {
        let codec = codec();
        let doc = json!({"id": "annie", "bio": "# Annie\n", "photo": "AAEC"});
        let (canonical, sidecars) = codec.split(&doc).unwrap();

        assert_eq!(canonical, json!({"id": "annie"}));
        assert_eq!(sidecars.len(), 2);
        let bio = sidecars.iter().find(|s| s.field == "bio").unwrap();
        assert_eq!(bio.bytes, b"# Annie\n");
        let photo = sidecars.iter().find(|s| s.field == "photo").unwrap();
        assert_eq!(photo.bytes, vec![0u8, 1, 2]);
    }

    #[test]
    fn absent_fields_produce_no_sidecar() {
        let (canonical, sidecars) = codec().split(&json!({"id": "bob"})).unwrap();
        assert_eq!(canonical, json!({"id": "bob"}));
        assert!(sidecars.is_empty());
    }

    #[test]
    fn decode_restores_values() {
        let codec = codec();
        assert_eq!(codec.decode("bio", b"hello".to_vec()).unwrap(), json!("hello"));
        assert_eq!(codec.decode("photo", vec![0, 1, 2]).unwrap(), json!("AAEC"));
        assert!(codec.decode("bio", vec![0xff, 0xfe]).is_err());
    }

    #[test]
    fn validate_rejects_sidecars_outside_the_item() {
        assert!(codec().validate().is_ok());

        let clobbers: BTreeMap<String, AttachmentSpec> =
            serde_json::from_value(json!({"_item": "json"})).unwrap();
        assert!(matches!(
            AttachmentCodec::new(clobbers).validate(),
            Err(CoreError::Attachment { .. })
        ));

        let escapes: BTreeMap<String, AttachmentSpec> =
            serde_json::from_value(json!({"bio": "md/../../../x"})).unwrap();
        assert!(AttachmentCodec::new(escapes).validate().is_err());

        let empty: BTreeMap<String, AttachmentSpec> =
            serde_json::from_value(json!({"bio": ""})).unwrap();
        assert!(AttachmentCodec::new(empty).validate().is_err());
    }

    #[test]
    fn check_rejects_unencodable_values() {
        let codec = codec();
        assert!(codec.check(&json!({"bio": "text"})).is_ok());
        assert!(matches!(
            codec.check(&json!({"bio": 42})),
            Err(CoreError::Attachment { .. })
        ));
        assert!(codec.check(&json!({"photo": "not base64!"})).is_err());
    }
}

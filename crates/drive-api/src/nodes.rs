//! File and folder metadata as the remote service reports it.

use serde::{Deserialize, Deserializer, Serialize};

/// MIME type the remote service uses to mark folder nodes.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Kind discriminator derived from a node's MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    File,
}

/// One node of the remote tree, exactly as a listing or metadata call
/// reports it.
///
/// `id`, `name` and `mime_type` are required; a response missing any of
/// them fails decoding rather than producing a half-populated node. The
/// wire encodes `size` as a decimal string and omits it entirely for
/// folders and for documents with no binary content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNode {
    /// Opaque stable identifier.
    pub id: String,
    /// Display name chosen by the remote owner. Untrusted for filesystem
    /// use until sanitized.
    pub name: String,
    /// Declared MIME classification.
    pub mime_type: String,
    /// Declared size in bytes, when the service reports one.
    #[serde(default, deserialize_with = "size_from_wire", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Identifiers of the parent folders containing this node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl RemoteNode {
    /// Folder or file, per the folder MIME marker.
    pub fn kind(&self) -> NodeKind {
        if self.mime_type == FOLDER_MIME {
            NodeKind::Folder
        } else {
            NodeKind::File
        }
    }
}

/// One page of a folder listing.
///
/// The listing is complete when `next_page_token` is absent; otherwise the
/// token must be echoed back to fetch the next page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePage {
    #[serde(default)]
    pub files: Vec<RemoteNode>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// The service reports sizes as decimal strings; accept a bare number too.
fn size_from_wire<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Number(u64),
        Text(String),
    }

    match Option::<Wire>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Wire::Number(n)) => Ok(Some(n)),
        Some(Wire::Text(s)) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_file_node() {
        let node: RemoteNode = serde_json::from_str(
            r#"{"id": "f1", "name": "book.pdf", "mimeType": "application/pdf", "size": "3145728"}"#,
        )
        .unwrap();

        assert_eq!(node.id, "f1");
        assert_eq!(node.name, "book.pdf");
        assert_eq!(node.size, Some(3_145_728));
        assert_eq!(node.kind(), NodeKind::File);
    }

    #[test]
    fn test_decode_folder_node_without_size() {
        let node: RemoteNode = serde_json::from_str(
            r#"{"id": "d1", "name": "books", "mimeType": "application/vnd.google-apps.folder"}"#,
        )
        .unwrap();

        assert_eq!(node.size, None);
        assert_eq!(node.kind(), NodeKind::Folder);
    }

    #[test]
    fn test_decode_numeric_size() {
        let node: RemoteNode = serde_json::from_str(
            r#"{"id": "f1", "name": "a.epub", "mimeType": "application/epub+zip", "size": 42}"#,
        )
        .unwrap();

        assert_eq!(node.size, Some(42));
    }

    #[test]
    fn test_missing_required_field_fails_decode() {
        // No id: the node must not decode into something half-populated.
        let result: Result<RemoteNode, _> =
            serde_json::from_str(r#"{"name": "book.pdf", "mimeType": "application/pdf"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unparseable_size_fails_decode() {
        let result: Result<RemoteNode, _> = serde_json::from_str(
            r#"{"id": "f1", "name": "a.pdf", "mimeType": "application/pdf", "size": "lots"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_listing_page() {
        let page: NodePage = serde_json::from_str(
            r#"{
                "nextPageToken": "tok-2",
                "files": [
                    {"id": "f1", "name": "a.pdf", "mimeType": "application/pdf", "size": "10"},
                    {"id": "d1", "name": "sub", "mimeType": "application/vnd.google-apps.folder"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(page.files.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn test_decode_empty_page() {
        let page: NodePage = serde_json::from_str("{}").unwrap();
        assert!(page.files.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_parents_default_empty() {
        let node: RemoteNode = serde_json::from_str(
            r#"{"id": "f1", "name": "a.pdf", "mimeType": "application/pdf", "parents": ["root1"]}"#,
        )
        .unwrap();
        assert_eq!(node.parents, vec!["root1"]);

        let bare: RemoteNode = serde_json::from_str(
            r#"{"id": "f2", "name": "b.pdf", "mimeType": "application/pdf"}"#,
        )
        .unwrap();
        assert!(bare.parents.is_empty());
    }
}

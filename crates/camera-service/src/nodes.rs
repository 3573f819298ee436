//! Vendor settings trees and canonical-name resolution
//!
//! Tethered bodies expose the same physical setting under different node
//! names (`iso` vs `iso-speed-value`, `aperture` vs `f-number`). The
//! resolver isolates that variability: exact lookup first, then a static
//! alias table, then a recursive case-insensitive search. Failed lookups
//! are values, never control flow.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One named entry in a vendor's hierarchical settings tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsNode {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub read_only: bool,
    /// Non-empty for container/section nodes
    #[serde(default)]
    pub children: Vec<SettingsNode>,
}

impl SettingsNode {
    pub fn leaf(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            ..Self::default()
        }
    }

    pub fn section(name: impl Into<String>, children: Vec<SettingsNode>) -> Self {
        Self {
            name: name.into(),
            children,
            ..Self::default()
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_section(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A whole vendor tree, rooted in an anonymous top-level section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsTree {
    pub root: SettingsNode,
}

impl SettingsTree {
    pub fn new(sections: Vec<SettingsNode>) -> Self {
        Self {
            root: SettingsNode::section("main", sections),
        }
    }
}

/// Canonical setting names mapped to the node names vendors use for them
static NODE_ALIASES: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    map.insert("aperture", &["f-number", "fnumber", "aperture-value"]);
    map.insert("iso", &["iso-speed", "iso-speed-value", "isospeed"]);
    map.insert(
        "shutter_speed",
        &["shutterspeed", "shutter-speed", "shutterspeed2", "exposure-time"],
    );
    map.insert("white_balance", &["whitebalance", "wb"]);
    map.insert("image_format", &["imageformat", "imagequality"]);
    map.insert(
        "exposure_compensation",
        &["exposurecompensation", "exposure-compensation"],
    );
    map.insert("focus_mode", &["focusmode", "autofocusmode"]);
    map
});

/// Locate the node for a canonical setting name. Steps short-circuit on
/// first success: exact name, alias table, recursive case-insensitive.
pub fn resolve<'a>(tree: &'a SettingsTree, canonical: &str) -> Option<&'a SettingsNode> {
    if let Some(node) = find_exact(&tree.root, canonical) {
        return Some(node);
    }
    if let Some(aliases) = NODE_ALIASES.get(canonical) {
        for alias in *aliases {
            if let Some(node) = find_exact(&tree.root, alias) {
                return Some(node);
            }
        }
    }
    find_fold_case(&tree.root, canonical)
}

fn find_exact<'a>(node: &'a SettingsNode, name: &str) -> Option<&'a SettingsNode> {
    for child in &node.children {
        if child.name == name {
            return Some(child);
        }
        if child.is_section() {
            if let Some(found) = find_exact(child, name) {
                return Some(found);
            }
        }
    }
    None
}

fn find_fold_case<'a>(node: &'a SettingsNode, name: &str) -> Option<&'a SettingsNode> {
    for child in &node.children {
        if child.name.eq_ignore_ascii_case(name) {
            return Some(child);
        }
        if child.is_section() {
            if let Some(found) = find_fold_case(child, name) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canon_like_tree() -> SettingsTree {
        SettingsTree::new(vec![
            SettingsNode::section(
                "imgsettings",
                vec![
                    SettingsNode::leaf("iso-speed-value", json!("400")),
                    SettingsNode::leaf("imageformat", json!("Large Fine JPEG")),
                    SettingsNode::leaf("Iso", json!("decoy")),
                ],
            ),
            SettingsNode::section(
                "capturesettings",
                vec![
                    SettingsNode::leaf("f-number", json!("5.6")),
                    SettingsNode::leaf("shutterspeed", json!("1/125")),
                    SettingsNode::leaf("serialnumber", json!("012345")).read_only(),
                ],
            ),
        ])
    }

    #[test]
    fn exact_name_wins() {
        let tree = canon_like_tree();
        let node = resolve(&tree, "shutterspeed").unwrap();
        assert_eq!(node.value, json!("1/125"));
    }

    #[test]
    fn alias_resolves_before_recursive_search() {
        // the tree also holds a case-insensitive "Iso" decoy; the alias
        // table must win before the fold-case fallback ever runs
        let tree = canon_like_tree();
        let node = resolve(&tree, "iso").unwrap();
        assert_eq!(node.name, "iso-speed-value");
        assert_eq!(node.value, json!("400"));
    }

    #[test]
    fn aperture_resolves_via_f_number_alias() {
        let tree = canon_like_tree();
        let node = resolve(&tree, "aperture").unwrap();
        assert_eq!(node.name, "f-number");
    }

    #[test]
    fn fold_case_fallback_descends_sections() {
        let tree = SettingsTree::new(vec![SettingsNode::section(
            "other",
            vec![SettingsNode::leaf("WhiteBalanceAdjustA", json!(0))],
        )]);
        let node = resolve(&tree, "whitebalanceadjusta").unwrap();
        assert_eq!(node.name, "WhiteBalanceAdjustA");
    }

    #[test]
    fn unresolvable_name_is_none() {
        let tree = canon_like_tree();
        assert!(resolve(&tree, "bulb-timer").is_none());
    }

    #[test]
    fn read_only_flag_survives_resolution() {
        let tree = canon_like_tree();
        assert!(resolve(&tree, "serialnumber").unwrap().read_only);
    }
}

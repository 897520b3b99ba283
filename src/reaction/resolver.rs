//! Resolve a connection path to `(component, type)` pairs.
//!
//! Walking `parent.children*.value` from component `A`:
//!
//! ```text
//! A        ── parent:reconnect_0      (marker: re-resolve when A.parent changes)
//! A.parent ── children:reconnect_0
//! child_1  ── value:<label>
//! child_2  ── value:<label>
//! ```
//!
//! Every property passed through on the way gets a reconnect marker, so the
//! connection follows the dynamic structure. Each component is walked at
//! most once per remaining path, so cyclic structures terminate.

use std::collections::HashSet;

use crate::component::Component;
use crate::error::{Error, Result};
use crate::types::Value;

use super::path::{ConnectionPath, Segment, Selector};

/// Resolve `path` starting at `anchor`. The final subscriptions use
/// `type_label`; markers use `<property>:reconnect_<index>`.
pub(crate) fn resolve(
    path: &ConnectionPath,
    index: usize,
    type_label: &str,
    anchor: Component,
) -> Result<Vec<(Component, String)>> {
    let mut walker = Walker {
        path,
        index,
        type_label,
        out: Vec::new(),
        visited: HashSet::new(),
    };
    walker.seek(path.segments(), &Value::Component(anchor))?;
    Ok(walker.out)
}

struct Walker<'a> {
    path: &'a ConnectionPath,
    index: usize,
    type_label: &'a str,
    out: Vec<(Component, String)>,
    /// `(component, segments left, selector)` already walked.
    visited: HashSet<(Component, usize, Selector)>,
}

impl Walker<'_> {
    fn seek(&mut self, segments: &[Segment], target: &Value) -> Result<()> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(());
        };
        if target.is_null() {
            return Ok(());
        }
        if let Value::Component(c) = target
            && !self.visited.insert((*c, segments.len(), first.selector))
        {
            return Ok(());
        }

        if rest.is_empty() {
            if let Value::Component(c) = target
                && c.is_alive()
            {
                self.out.push((*c, self.type_label.to_string()));
            }
            if !first.selector.is_deep() {
                return Ok(());
            }
        }

        if first.selector == Selector::DeepOptional {
            self.seek(rest, target)?;
        }

        let next = match target {
            Value::Component(c) if c.has_property(&first.name) => {
                self.out
                    .push((*c, format!("{}:reconnect_{}", first.name, self.index)));
                c.peek(&first.name).unwrap_or_default()
            }
            Value::Component(c) => c.attribute(&first.name).unwrap_or_default(),
            _ => Value::Null,
        };

        match (&next, first.selector) {
            (Value::List(items), Selector::Each | Selector::Deep | Selector::DeepOptional) => {
                let deeper;
                let rest = if first.selector.is_deep() {
                    let mut segments = Vec::with_capacity(rest.len() + 1);
                    segments.push(Segment {
                        name: first.name.clone(),
                        selector: Selector::DeepOptional,
                    });
                    segments.extend_from_slice(rest);
                    deeper = segments;
                    deeper.as_slice()
                } else {
                    rest
                };
                for item in items {
                    self.seek(rest, item)?;
                }
                Ok(())
            }
            (_, Selector::Each) => Err(Error::UnresolvableConnection {
                path: self.path.fullname().to_string(),
                reason: format!("`{}` is not a list", first.name),
            }),
            _ => self.seek(rest, &next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentType, PropInit, PropSpec};
    use crate::engine::scheduler::reset_runtime;

    fn node_type() -> ComponentType {
        reset_runtime();
        ComponentType::builder("Node")
            .property("val", PropSpec::int(0))
            .property("parent", PropSpec::component())
            .property("children", PropSpec::tuple(vec![]))
            .build()
            .unwrap()
    }

    fn node(ty: &ComponentType, props: Vec<(&str, PropInit)>) -> Component {
        Component::new(ty, props).unwrap()
    }

    fn types(out: &[(Component, String)]) -> Vec<String> {
        out.iter().map(|(c, t)| format!("{}/{}", c.id(), t)).collect()
    }

    #[test]
    fn test_own_property() {
        let ty = node_type();
        let a = node(&ty, vec![]);
        let out = resolve(&ConnectionPath::parse("val").unwrap(), 0, "val:r", a).unwrap();
        assert_eq!(out, vec![(a, "val:r".to_string())]);
    }

    #[test]
    fn test_through_property_adds_marker() {
        let ty = node_type();
        let p = node(&ty, vec![]);
        let a = node(&ty, vec![("parent", p.into())]);
        let out = resolve(&ConnectionPath::parse("parent.val").unwrap(), 2, "val:r", a).unwrap();
        assert_eq!(
            types(&out),
            vec![
                format!("{}/parent:reconnect_2", a.id()),
                format!("{}/val:r", p.id())
            ]
        );
    }

    #[test]
    fn test_null_intermediate_keeps_marker_only() {
        let ty = node_type();
        let a = node(&ty, vec![]);
        let out = resolve(&ConnectionPath::parse("parent.val").unwrap(), 0, "val:r", a).unwrap();
        assert_eq!(out, vec![(a, "parent:reconnect_0".to_string())]);
    }

    #[test]
    fn test_fan_out() {
        let ty = node_type();
        let c1 = node(&ty, vec![]);
        let c2 = node(&ty, vec![]);
        let a = node(&ty, vec![("children", Value::List(vec![c1.into(), c2.into()]).into())]);
        let out = resolve(&ConnectionPath::parse("children*.val").unwrap(), 0, "val:r", a).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], (c1, "val:r".to_string()));
        assert_eq!(out[2], (c2, "val:r".to_string()));
    }

    #[test]
    fn test_star_on_non_list_fails() {
        let ty = node_type();
        let a = node(&ty, vec![]);
        let err = resolve(&ConnectionPath::parse("parent*.val").unwrap(), 0, "val:r", a);
        assert!(matches!(err, Err(Error::UnresolvableConnection { .. })));
    }

    #[test]
    fn test_deep_fan_out() {
        let ty = node_type();
        let leaf = node(&ty, vec![]);
        let mid = node(&ty, vec![("children", Value::List(vec![leaf.into()]).into())]);
        let root = node(&ty, vec![("children", Value::List(vec![mid.into()]).into())]);
        let out = resolve(&ConnectionPath::parse("children**.val").unwrap(), 0, "val:r", root).unwrap();
        let finals: Vec<Component> = out
            .iter()
            .filter(|(_, t)| t == "val:r")
            .map(|(c, _)| *c)
            .collect();
        assert_eq!(finals, vec![mid, leaf]);
        // Markers on every level that holds children
        assert!(out.contains(&(root, "children:reconnect_0".to_string())));
        assert!(out.contains(&(mid, "children:reconnect_0".to_string())));
    }

    #[test]
    fn test_deep_fan_out_on_cycle_terminates() {
        let ty = node_type();
        let a = node(&ty, vec![]);
        let b = node(&ty, vec![("children", Value::List(vec![a.into()]).into())]);
        a.scope(|| a.mutate("children", Value::List(vec![a.into(), b.into()])))
            .unwrap()
            .unwrap();

        let out = resolve(&ConnectionPath::parse("children**.val").unwrap(), 0, "val:r", a).unwrap();
        let finals: Vec<Component> = out
            .iter()
            .filter(|(_, t)| t == "val:r")
            .map(|(c, _)| *c)
            .collect();
        assert_eq!(finals, vec![a, b]);
    }
}

use std::collections::{HashMap, HashSet};

use crate::diff::result::FieldDiff;
use crate::{FieldValue, Fields};

/// Comparison knobs.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// List field name -> key field used to pair up map elements, so a
    /// reordered list of named objects compares element by element
    /// (for example `ike_gateway` -> `name`).
    pub key_fields: HashMap<String, String>,
    /// Field names or full dotted paths never compared.
    pub ignore_paths: Vec<String>,
}

/// Compare `current` with `proposed` using default options.
pub fn diff(current: &Fields, proposed: &Fields) -> Vec<FieldDiff> {
    diff_with_options(current, proposed, &DiffOptions::default())
}

pub fn diff_with_options(current: &Fields, proposed: &Fields, opts: &DiffOptions) -> Vec<FieldDiff> {
    let mut walk = Walk {
        opts,
        out: Vec::new(),
    };
    walk.fields(current, proposed, "");
    walk.out
}

struct Walk<'a> {
    opts: &'a DiffOptions,
    out: Vec<FieldDiff>,
}

impl Walk<'_> {
    /// Keys in `current` order, then keys only the proposal has.
    fn fields(&mut self, current: &Fields, proposed: &Fields, prefix: &str) {
        let added = proposed.keys().filter(|k| !current.contains_key(k));
        let keys: Vec<&str> = current.keys().chain(added).collect();

        for key in keys {
            let path = child_path(prefix, key);
            if self.ignored(&path, key) {
                continue;
            }
            match (current.get(key), proposed.get(key)) {
                (Some(c), Some(p)) => self.value(c, p, key, &path),
                (Some(c), None) => self.out.push(FieldDiff::Removed {
                    path,
                    value: c.clone(),
                }),
                (None, Some(p)) => self.out.push(FieldDiff::Added {
                    path,
                    value: p.clone(),
                }),
                (None, None) => {}
            }
        }
    }

    fn value(&mut self, current: &FieldValue, proposed: &FieldValue, field: &str, path: &str) {
        match (current, proposed) {
            (FieldValue::Map(c), FieldValue::Map(p)) => self.fields(c, p, path),
            (FieldValue::List(c), FieldValue::List(p)) => match self.opts.key_fields.get(field) {
                Some(key_field) => self.keyed_list(c, p, field, key_field, path),
                None => self.positional_list(c, p, field, path),
            },
            (c, p) if c.kind() != p.kind() => self.out.push(FieldDiff::Structural {
                path: path.to_string(),
                description: format!("was {}, now {}", c.kind(), p.kind()),
            }),
            (c, p) if c != p => self.out.push(FieldDiff::Changed {
                path: path.to_string(),
                current: c.to_string(),
                proposed: p.to_string(),
            }),
            _ => {}
        }
    }

    /// Elements paired by position; paths are 1-based (`static[2]`).
    fn positional_list(&mut self, current: &[FieldValue], proposed: &[FieldValue], field: &str, path: &str) {
        for i in 0..current.len().max(proposed.len()) {
            let at = format!("{path}[{}]", i + 1);
            match (current.get(i), proposed.get(i)) {
                (Some(c), Some(p)) => self.value(c, p, field, &at),
                (Some(c), None) => self.out.push(FieldDiff::Removed {
                    path: at,
                    value: c.clone(),
                }),
                (None, Some(p)) => self.out.push(FieldDiff::Added {
                    path: at,
                    value: p.clone(),
                }),
                (None, None) => {}
            }
        }
    }

    /// Elements paired by `key_field`; paths name the element (`rules[r100]`).
    /// Elements without the key fall back to their position in the path.
    fn keyed_list(
        &mut self,
        current: &[FieldValue],
        proposed: &[FieldValue],
        field: &str,
        key_field: &str,
        path: &str,
    ) {
        let element_key = |value: &FieldValue| {
            value
                .as_map()
                .and_then(|map| map.get_text(&[key_field]))
                .map(ToString::to_string)
        };
        let label = |key: &Option<String>, idx: usize| match key {
            Some(key) => format!("{path}[{key}]"),
            None => format!("{path}[{}]", idx + 1),
        };
        let proposed_keys: Vec<Option<String>> = proposed.iter().map(element_key).collect();
        let mut paired: HashSet<usize> = HashSet::new();

        for (idx, c) in current.iter().enumerate() {
            let key = element_key(c);
            let at = label(&key, idx);
            let partner = key.as_ref().and_then(|wanted| {
                proposed_keys
                    .iter()
                    .enumerate()
                    .position(|(i, k)| !paired.contains(&i) && k.as_ref() == Some(wanted))
            });
            match partner {
                Some(i) => {
                    paired.insert(i);
                    self.value(c, &proposed[i], field, &at);
                }
                None => self.out.push(FieldDiff::Removed {
                    path: at,
                    value: c.clone(),
                }),
            }
        }

        for (idx, p) in proposed.iter().enumerate() {
            if !paired.contains(&idx) {
                self.out.push(FieldDiff::Added {
                    path: label(&proposed_keys[idx], idx),
                    value: p.clone(),
                });
            }
        }
    }

    fn ignored(&self, path: &str, key: &str) -> bool {
        self.opts
            .ignore_paths
            .iter()
            .any(|ignore| ignore == path || ignore == key)
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

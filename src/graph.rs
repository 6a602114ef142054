//! Resource ordering derived from a synthesized template. CloudFormation
//! does the same derivation itself; doing it locally catches dangling
//! references and cycles before a deploy is attempted, and lets `plan`
//! show what will be created in which order.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::stack::SavedTemplate;

/// collect every logical id `value` refers to through `Ref`,
/// `Fn::GetAtt` or `Fn::Sub`. Pseudo parameters are skipped.
pub fn references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                insert_ref(target, out);
            }
            match map.get("Fn::GetAtt") {
                Some(Value::Array(parts)) => {
                    if let Some(Value::String(target)) = parts.first() {
                        insert_ref(target, out);
                    }
                }
                // the short `Resource.Attribute` form
                Some(Value::String(dotted)) => {
                    if let Some((target, _)) = dotted.split_once('.') {
                        insert_ref(target, out);
                    }
                }
                _ => {}
            }
            match map.get("Fn::Sub") {
                Some(Value::String(template)) => sub_references(template, out),
                Some(Value::Array(parts)) => {
                    if let Some(Value::String(template)) = parts.first() {
                        let mut found = BTreeSet::new();
                        sub_references(template, &mut found);
                        // variables defined in the map are not resources
                        if let Some(Value::Object(vars)) = parts.get(1) {
                            found.retain(|name| !vars.contains_key(name));
                        }
                        out.extend(found);
                    }
                }
                _ => {}
            }
            for val in map.values() {
                references(val, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                references(item, out);
            }
        }
        _ => {}
    }
}

fn insert_ref(target: &str, out: &mut BTreeSet<String>) {
    if !target.starts_with("AWS::") {
        out.insert(target.to_string());
    }
}

/// `${Name}` and `${Name.Attr}` placeholders. `${!Literal}` is an escape.
fn sub_references(template: &str, out: &mut BTreeSet<String>) {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let var = &after[..end];
        if !var.starts_with('!') {
            let name = var.split('.').next().unwrap_or(var);
            insert_ref(name, out);
        }
        rest = &after[end + 1..];
    }
}

/// logical id -> the logical ids it must be created after.
pub fn dependencies(template: &SavedTemplate) -> BTreeMap<String, BTreeSet<String>> {
    template
        .resources
        .iter()
        .map(|(name, resource)| {
            let mut deps = BTreeSet::new();
            references(&resource.properties, &mut deps);
            deps.extend(resource.depends_on.iter().cloned());
            (name.clone(), deps)
        })
        .collect()
}

/// Fails on any reference, from a resource or an output, to something that
/// is not a resource of this template.
pub fn check(template: &SavedTemplate) -> Result<()> {
    for (name, deps) in dependencies(template) {
        if let Some(missing) = deps.iter().find(|d| !template.resources.contains_key(*d)) {
            return Err(Error::UnresolvedReference { from: name, to: missing.clone() });
        }
    }
    for (name, output) in template.outputs.iter() {
        let mut deps = BTreeSet::new();
        references(&output.value, &mut deps);
        if let Some(missing) = deps.into_iter().find(|d| !template.resources.contains_key(d)) {
            return Err(Error::UnresolvedReference { from: name.clone(), to: missing });
        }
    }
    Ok(())
}

/// Kahn layering. Every resource in a wave only depends on resources in
/// earlier waves.
pub fn creation_waves(template: &SavedTemplate) -> Result<Vec<BTreeSet<String>>> {
    check(template)?;
    let mut remaining = dependencies(template);
    let mut waves = vec![];
    while !remaining.is_empty() {
        let ready: BTreeSet<String> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        if ready.is_empty() {
            return Err(Error::DependencyCycle(remaining.into_keys().collect()));
        }
        remaining.retain(|name, _| !ready.contains(name));
        for deps in remaining.values_mut() {
            deps.retain(|d| !ready.contains(d));
        }
        waves.push(ready);
    }
    Ok(waves)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stack::{ResourceOutput, SavedResource};
    use serde_json::json;

    fn template(resources: Vec<(&str, Value, Vec<&str>)>) -> SavedTemplate {
        let mut t = SavedTemplate::default();
        for (name, properties, depends_on) in resources {
            t.resources.insert(
                name.to_string(),
                SavedResource {
                    ty: "AWS::Test::Thing".to_string(),
                    properties,
                    depends_on: depends_on.into_iter().map(String::from).collect(),
                    ..Default::default()
                },
            );
        }
        t
    }

    #[test]
    fn finds_every_reference_form() {
        let mut out = BTreeSet::new();
        references(
            &json!({
                "A": { "Ref": "Bucket" },
                "B": [{ "Fn::GetAtt": ["Dist", "DomainName"] }],
                "C": { "Fn::GetAtt": "Oai.S3CanonicalUserId" },
                "D": { "Fn::Sub": "arn:${AWS::Partition}:s3:::${Site}/${Cert.Arn}${!Literal}" },
                "E": { "Fn::Sub": ["${Local}-${Role}", { "Local": "x" }] },
                "F": { "Ref": "AWS::Region" },
            }),
            &mut out,
        );
        let expected: BTreeSet<String> = ["Bucket", "Dist", "Oai", "Site", "Cert", "Role"].iter().map(|s| s.to_string()).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn waves_follow_references() {
        let t = template(vec![
            ("Oai", json!({}), vec![]),
            ("Bucket", json!({}), vec![]),
            ("Policy", json!({ "Bucket": { "Ref": "Bucket" }, "P": { "Fn::GetAtt": ["Oai", "S3CanonicalUserId"] } }), vec![]),
            ("Dist", json!({ "O": { "Ref": "Oai" } }), vec![]),
            ("Record", json!({ "T": { "Fn::GetAtt": ["Dist", "DomainName"] } }), vec!["Policy"]),
        ]);
        let waves = creation_waves(&t).unwrap();
        assert_eq!(waves.len(), 3);
        assert!(waves[0].contains("Oai") && waves[0].contains("Bucket"));
        assert!(waves[1].contains("Policy") && waves[1].contains("Dist"));
        assert!(waves[2].contains("Record"));
    }

    #[test]
    fn dangling_references_are_reported() {
        let t = template(vec![("Dist", json!({ "O": { "Ref": "Missing" } }), vec![])]);
        match check(&t) {
            Err(Error::UnresolvedReference { from, to }) => {
                assert_eq!(from, "Dist");
                assert_eq!(to, "Missing");
            }
            other => panic!("expected unresolved reference, got {:?}", other),
        }

        let mut t = template(vec![("Dist", json!({}), vec![])]);
        t.outputs.insert("Out".to_string(), ResourceOutput { description: "d".to_string(), value: json!({ "Ref": "Gone" }) });
        assert!(matches!(check(&t), Err(Error::UnresolvedReference { to, .. }) if to == "Gone"));
    }

    #[test]
    fn cycles_are_reported() {
        let t = template(vec![
            ("A", json!({ "Ref": "B" }), vec![]),
            ("B", json!({}), vec!["A"]),
            ("C", json!({}), vec![]),
        ]);
        match creation_waves(&t) {
            Err(Error::DependencyCycle(names)) => assert_eq!(names, vec!["A".to_string(), "B".to_string()]),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }
}

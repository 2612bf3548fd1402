//! Intrinsic function builders and string concatenation.

use serde_json::{json, Value};

use crate::error::{CoreError, CoreResult};
use crate::value::Prop;

pub const FN_JOIN: &str = "Fn::Join";
pub const FN_GET_ATT: &str = "Fn::GetAtt";
pub const FN_IMPORT_VALUE: &str = "Fn::ImportValue";
pub const FN_SUB: &str = "Fn::Sub";
pub const REF: &str = "Ref";

/// Pseudo parameters.
pub mod pseudo {
    pub const ACCOUNT_ID: &str = "AWS::AccountId";
    pub const REGION: &str = "AWS::Region";
    pub const PARTITION: &str = "AWS::Partition";
    pub const STACK_NAME: &str = "AWS::StackName";
}

/// `{"Ref": logical_id}`
pub fn reference(logical_id: &str) -> Prop {
    Prop::map([(REF, Prop::from(logical_id))])
}

/// `{"Fn::GetAtt": [logical_id, attribute]}`
pub fn get_att(logical_id: &str, attribute: &str) -> Prop {
    Prop::map([(
        FN_GET_ATT,
        Prop::list([Prop::from(logical_id), Prop::from(attribute)]),
    )])
}

/// `{"Fn::ImportValue": export_name}`
pub fn import_value(export_name: &str) -> Prop {
    Prop::map([(FN_IMPORT_VALUE, Prop::from(export_name))])
}

/// `{"Fn::Join": [delimiter, parts]}`
pub fn join(delimiter: &str, parts: Vec<Prop>) -> Prop {
    Prop::map([(FN_JOIN, Prop::list([Prop::from(delimiter), Prop::List(parts)]))])
}

/// `{"Fn::Sub": template}`
pub fn sub(template: &str) -> Prop {
    Prop::map([(FN_SUB, Prop::from(template))])
}

/// Whether `value` is a single-key object whose key is an intrinsic.
pub fn is_intrinsic(value: &Value) -> bool {
    match value {
        Value::Object(obj) if obj.len() == 1 => obj
            .keys()
            .next()
            .map(|k| k == REF || k.starts_with("Fn::"))
            .unwrap_or(false),
        _ => false,
    }
}

/// Parts of an empty-delimiter `Fn::Join`, if `value` is one.
fn plain_join_parts(value: &Value) -> Option<&Vec<Value>> {
    let args = value.as_object()?.get(FN_JOIN)?.as_array()?;
    match args.as_slice() {
        [Value::String(delimiter), Value::Array(parts)] if delimiter.is_empty() => Some(parts),
        _ => None,
    }
}

/// Concatenate resolved fragments.
///
/// Adjacent literal fragments collapse into one string; the result is a plain
/// string when every fragment is literal, otherwise an empty-delimiter
/// `Fn::Join`. `context` names the source text in error messages.
pub fn concat_fragments(parts: Vec<Value>, context: &str) -> CoreResult<Value> {
    let mut out: Vec<Value> = Vec::new();
    for part in parts {
        append_fragment(&mut out, part, context)?;
    }

    if let [Value::String(single)] = out.as_slice() {
        return Ok(Value::String(single.clone()));
    }
    if out.is_empty() {
        return Ok(Value::String(String::new()));
    }

    let mut join = serde_json::Map::new();
    join.insert(FN_JOIN.to_string(), json!(["", out]));
    Ok(Value::Object(join))
}

fn append_fragment(out: &mut Vec<Value>, part: Value, context: &str) -> CoreResult<()> {
    match part {
        Value::String(s) => push_text(out, &s),
        Value::Number(n) => push_text(out, &n.to_string()),
        Value::Bool(b) => push_text(out, &b.to_string()),
        Value::Object(_) => {
            if let Some(inner) = plain_join_parts(&part) {
                for nested in inner.clone() {
                    append_fragment(out, nested, context)?;
                }
            } else if is_intrinsic(&part) {
                out.push(part);
            } else {
                return Err(CoreError::InvalidEmbedding {
                    kind: "an object".to_string(),
                    context: context.to_string(),
                });
            }
        }
        Value::Array(_) => {
            return Err(CoreError::InvalidEmbedding {
                kind: "a list".to_string(),
                context: context.to_string(),
            })
        }
        Value::Null => {
            return Err(CoreError::InvalidEmbedding {
                kind: "null".to_string(),
                context: context.to_string(),
            })
        }
    }
    Ok(())
}

fn push_text(out: &mut Vec<Value>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Value::String(last)) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(Value::String(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_fragments_collapse() {
        let value = concat_fragments(
            vec![json!("a"), json!(1), json!(""), json!("b"), json!(true)],
            "test",
        )
        .unwrap();
        assert_eq!(value, json!("a1btrue"));
    }

    #[test]
    fn test_intrinsic_fragments_produce_join() {
        let value = concat_fragments(
            vec![json!("arn:"), json!({"Ref": "Bucket"}), json!("/"), json!("*")],
            "test",
        )
        .unwrap();
        assert_eq!(value, json!({"Fn::Join": ["", ["arn:", {"Ref": "Bucket"}, "/*"]]}));
    }

    #[test]
    fn test_nested_join_is_flattened() {
        let inner = json!({"Fn::Join": ["", ["x", {"Ref": "A"}]]});
        let value = concat_fragments(vec![json!("pre-"), inner], "test").unwrap();
        assert_eq!(value, json!({"Fn::Join": ["", ["pre-x", {"Ref": "A"}]]}));
    }

    #[test]
    fn test_list_cannot_be_embedded() {
        let result = concat_fragments(vec![json!("a"), json!([1, 2])], "a${list}");
        assert!(matches!(result, Err(CoreError::InvalidEmbedding { .. })));
    }

    #[test]
    fn test_builders() {
        assert!(matches!(reference("Bucket").get(REF), Some(Prop::String(s)) if s == "Bucket"));
        assert!(get_att("Bucket", "Arn").get(FN_GET_ATT).is_some());
        assert!(is_intrinsic(&json!({"Fn::ImportValue": "x"})));
        assert!(!is_intrinsic(&json!({"Name": "x"})));
    }
}

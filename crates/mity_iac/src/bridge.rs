//! Export writer and reader constructs.
//!
//! The dependency graph owns one [`ExportWriterBuilder`] per producing stack
//! and one [`ExportReaderBuilder`] per `(consumer, producer region)` pair.
//! Builders only accumulate keys; template resources are generated from them
//! once every reference is registered.

use std::collections::{BTreeMap, BTreeSet};

use mity_bridge::{
    export_key, READER_ACTIONS, READER_PROPS_KEY, READER_RESOURCE_TYPE, WRITER_ACTIONS,
    WRITER_PROPS_KEY, WRITER_RESOURCE_TYPE,
};
use mity_core::intrinsics::{self, pseudo};
use mity_core::Prop;

use crate::config::BridgeFunctionConfig;
use crate::error::{IacError, IacResult};

/// Logical id of a producer's writer resource.
pub const WRITER_ID: &str = "ExportsWriter";

/// Logical id of the reader reading from `region`, e.g. `ExportsReaderUsEast1`.
pub fn reader_id(region: &str) -> String {
    let pascal: String = region
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    format!("ExportsReader{}", pascal)
}

/// Publishes a producing stack's bridged exports.
#[derive(Debug, Clone)]
pub struct ExportWriterBuilder {
    producer: String,
    region: String,
    prefix: String,
    exports: BTreeMap<String, Prop>,
}

impl ExportWriterBuilder {
    pub fn new(producer: impl Into<String>, region: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            region: region.into(),
            prefix: prefix.into(),
            exports: BTreeMap::new(),
        }
    }

    /// Publish `value` under `logical_name`, returning the store key.
    ///
    /// Publishing the same value twice is a no-op; a different value under
    /// an existing key is an [`IacError::ExportConflict`].
    pub fn add_export(&mut self, logical_name: &str, value: &Prop) -> IacResult<String> {
        let key = export_key(&self.prefix, &self.producer, logical_name);
        match self.exports.get(&key) {
            Some(existing) if existing != value => {
                return Err(IacError::export_conflict(&self.producer, logical_name, existing, value));
            }
            Some(_) => {}
            None => {
                self.exports.insert(key.clone(), value.clone());
            }
        }
        Ok(key)
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.exports.keys()
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    /// Template resources backing the writer.
    pub fn resources(&self, function: &BridgeFunctionConfig) -> BTreeMap<String, Prop> {
        let arn = parameter_arn(&self.region, &self.prefix, &self.producer);
        let props = Prop::map([
            ("region", Prop::from(self.region.as_str())),
            ("prefix", Prop::from(self.prefix.as_str())),
            ("exports", Prop::Map(self.exports.clone())),
        ]);
        handler_resources(
            WRITER_ID,
            WRITER_RESOURCE_TYPE,
            WRITER_PROPS_KEY,
            props,
            &WRITER_ACTIONS,
            vec![arn],
            function,
        )
    }
}

/// Reads every bridged import a consumer needs from one producer region.
#[derive(Debug, Clone)]
pub struct ExportReaderBuilder {
    consumer: String,
    region: String,
    prefix: String,
    imports: BTreeMap<String, String>,
    producers: BTreeSet<String>,
}

impl ExportReaderBuilder {
    pub fn new(consumer: impl Into<String>, region: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            region: region.into(),
            prefix: prefix.into(),
            imports: BTreeMap::new(),
            producers: BTreeSet::new(),
        }
    }

    /// Read `producer`'s `logical_name`, returning the store key.
    pub fn add_import(&mut self, producer: &str, logical_name: &str) -> String {
        let key = export_key(&self.prefix, producer, logical_name);
        self.imports
            .entry(key.clone())
            .or_insert_with(|| format!("{}.{}", producer, logical_name));
        self.producers.insert(producer.to_string());
        key
    }

    pub fn logical_id(&self) -> String {
        reader_id(&self.region)
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn imports(&self) -> &BTreeMap<String, String> {
        &self.imports
    }

    /// Producing stacks whose namespace the reader may access.
    pub fn producers(&self) -> &BTreeSet<String> {
        &self.producers
    }

    /// Attribute of the reader holding the value of `key`.
    pub fn attribute(&self, key: &str) -> Prop {
        intrinsics::get_att(&self.logical_id(), key)
    }

    /// Template resources backing the reader.
    pub fn resources(&self, function: &BridgeFunctionConfig) -> BTreeMap<String, Prop> {
        let arns = self
            .producers
            .iter()
            .map(|producer| parameter_arn(&self.region, &self.prefix, producer))
            .collect();
        let props = Prop::map([
            ("region", Prop::from(self.region.as_str())),
            ("prefix", Prop::from(self.prefix.as_str())),
            (
                "imports",
                Prop::Map(
                    self.imports
                        .iter()
                        .map(|(k, v)| (k.clone(), Prop::from(v.as_str())))
                        .collect(),
                ),
            ),
        ]);
        handler_resources(
            &self.logical_id(),
            READER_RESOURCE_TYPE,
            READER_PROPS_KEY,
            props,
            &READER_ACTIONS,
            arns,
            function,
        )
    }
}

/// `arn:<partition>:ssm:<region>:<account>:parameter/<prefix>/<producer>/*`
fn parameter_arn(region: &str, prefix: &str, producer: &str) -> Prop {
    intrinsics::join(
        "",
        vec![
            Prop::from("arn:"),
            intrinsics::reference(pseudo::PARTITION),
            Prop::from(format!(":ssm:{}:", region)),
            intrinsics::reference(pseudo::ACCOUNT_ID),
            Prop::from(format!(":parameter/{}/{}/*", prefix.trim_matches('/'), producer)),
        ],
    )
}

/// Role, function and custom resource for one bridge handler.
fn handler_resources(
    id: &str,
    resource_type: &str,
    props_key: &str,
    props: Prop,
    actions: &[&str],
    arns: Vec<Prop>,
    function: &BridgeFunctionConfig,
) -> BTreeMap<String, Prop> {
    let role_id = format!("{}Role", id);
    let function_id = format!("{}Function", id);

    let statement = Prop::map([
        ("Effect", Prop::from("Allow")),
        ("Action", Prop::list(actions.iter().map(|a| Prop::from(*a)))),
        ("Resource", Prop::List(arns)),
    ]);
    let role = Prop::map([
        ("Type", Prop::from("AWS::IAM::Role")),
        (
            "Properties",
            Prop::map([
                (
                    "AssumeRolePolicyDocument",
                    Prop::map([
                        ("Version", Prop::from("2012-10-17")),
                        (
                            "Statement",
                            Prop::list([Prop::map([
                                ("Effect", Prop::from("Allow")),
                                ("Action", Prop::from("sts:AssumeRole")),
                                (
                                    "Principal",
                                    Prop::map([("Service", Prop::from("lambda.amazonaws.com"))]),
                                ),
                            ])]),
                        ),
                    ]),
                ),
                (
                    "ManagedPolicyArns",
                    Prop::list([intrinsics::join(
                        "",
                        vec![
                            Prop::from("arn:"),
                            intrinsics::reference(pseudo::PARTITION),
                            Prop::from(":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
                        ],
                    )]),
                ),
                (
                    "Policies",
                    Prop::list([Prop::map([
                        ("PolicyName", Prop::from(id)),
                        (
                            "PolicyDocument",
                            Prop::map([
                                ("Version", Prop::from("2012-10-17")),
                                ("Statement", Prop::list([statement])),
                            ]),
                        ),
                    ])]),
                ),
            ]),
        ),
    ]);

    let handler = Prop::map([
        ("Type", Prop::from("AWS::Lambda::Function")),
        (
            "Properties",
            Prop::map([
                ("Runtime", Prop::from(function.runtime.as_str())),
                ("Handler", Prop::from(function.handler.as_str())),
                ("Timeout", Prop::from(function.timeout_seconds)),
                ("MemorySize", Prop::from(function.memory_size)),
                ("Role", intrinsics::get_att(&role_id, "Arn")),
                (
                    "Code",
                    Prop::map([
                        ("S3Bucket", intrinsics::sub(&function.code_bucket)),
                        ("S3Key", Prop::from(function.code_key.as_str())),
                    ]),
                ),
            ]),
        ),
    ]);

    let custom = Prop::map([
        ("Type", Prop::from(resource_type)),
        (
            "Properties",
            Prop::map([
                ("ServiceToken", intrinsics::get_att(&function_id, "Arn")),
                (props_key, props),
            ]),
        ),
    ]);

    BTreeMap::from([(role_id, role), (function_id, handler), (id.to_string(), custom)])
}

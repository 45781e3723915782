//! Contract interface descriptor
//!
//! Parses an externally supplied ABI JSON document, either a bare entry array
//! or a build artifact carrying an `abi` field. Only `function` entries are
//! kept; a function whose parameter types cannot be represented is skipped
//! with a warning so the rest of the interface stays usable.

use crate::abi::{self, ParamType, Token};
use crate::operation::Operation;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

const BUNDLED_DESCRIPTOR: &str = include_str!("../abi/HydrogenCreditCertificate.json");

#[derive(Debug, Clone, Deserialize)]
struct RawParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    components: Vec<RawParam>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type", default = "default_entry_kind")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<RawParam>,
    #[serde(default)]
    outputs: Vec<RawParam>,
    #[serde(rename = "stateMutability", default)]
    state_mutability: Option<String>,
    #[serde(default)]
    constant: Option<bool>,
}

fn default_entry_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DescriptorDocument {
    Bare(Vec<RawEntry>),
    Artifact { abi: Vec<RawEntry> },
}

/// Declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamType,
}

impl Param {
    fn from_raw(raw: &RawParam) -> Result<Self> {
        let components = raw
            .components
            .iter()
            .map(|c| Param::from_raw(c).map(|p| p.kind))
            .collect::<Result<Vec<_>>>()?;
        Ok(Param {
            name: raw.name.clone(),
            kind: ParamType::parse(&raw.kind, &components)?,
        })
    }
}

/// State mutability of a declared function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Pure,
    View,
    NonPayable,
    Payable,
}

/// Declared contract function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    pub mutability: Mutability,
}

impl Function {
    fn from_raw(raw: &RawEntry) -> Result<Self> {
        let inputs = raw.inputs.iter().map(Param::from_raw).collect::<Result<_>>()?;
        let outputs = raw.outputs.iter().map(Param::from_raw).collect::<Result<_>>()?;
        let mutability = match raw.state_mutability.as_deref() {
            Some("pure") => Mutability::Pure,
            Some("view") => Mutability::View,
            Some("payable") => Mutability::Payable,
            Some(_) => Mutability::NonPayable,
            None if raw.constant == Some(true) => Mutability::View,
            None => Mutability::NonPayable,
        };
        Ok(Function {
            name: raw.name.clone(),
            inputs,
            outputs,
            mutability,
        })
    }

    /// Canonical signature, e.g. `approveAmount(uint256,uint256,string)`
    pub fn signature(&self) -> String {
        let args = self
            .inputs
            .iter()
            .map(|p| p.kind.canonical())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({})", self.name, args)
    }

    pub fn selector(&self) -> [u8; 4] {
        abi::selector(&self.signature())
    }

    /// Whether calling this function cannot change contract state
    pub fn is_read_only(&self) -> bool {
        matches!(self.mutability, Mutability::Pure | Mutability::View)
    }

    /// Selector followed by the encoded arguments, type-checked against the declaration
    pub fn encode_input(&self, args: &[Token]) -> Result<Vec<u8>> {
        if args.len() != self.inputs.len() {
            return Err(Error::Abi(format!(
                "{} expects {} arguments, got {}",
                self.signature(),
                self.inputs.len(),
                args.len()
            )));
        }
        for (param, arg) in self.inputs.iter().zip(args) {
            if !param.kind.matches(arg) {
                return Err(Error::Abi(format!(
                    "argument '{}' of {} is not a {}",
                    param.name,
                    self.signature(),
                    param.kind.canonical()
                )));
            }
        }

        let mut data = self.selector().to_vec();
        data.extend(abi::encode(args));
        Ok(data)
    }

    /// Split calldata into arguments; `None` if the selector does not match
    pub fn decode_input(&self, data: &[u8]) -> Option<Result<Vec<Token>>> {
        if data.len() < 4 || data[..4] != self.selector() {
            return None;
        }
        Some(abi::decode(&self.input_types(), &data[4..]))
    }

    /// Encode return values, type-checked against the declaration
    pub fn encode_output(&self, values: &[Token]) -> Result<Vec<u8>> {
        let matches = values.len() == self.outputs.len()
            && self.outputs.iter().zip(values).all(|(p, v)| p.kind.matches(v));
        if !matches {
            return Err(Error::Abi(format!(
                "return values do not match the outputs of {}",
                self.signature()
            )));
        }
        Ok(abi::encode(values))
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<Token>> {
        let types: Vec<ParamType> = self.outputs.iter().map(|p| p.kind.clone()).collect();
        abi::decode(&types, data)
    }

    fn input_types(&self) -> Vec<ParamType> {
        self.inputs.iter().map(|p| p.kind.clone()).collect()
    }
}

/// Set of functions a contract declares
#[derive(Debug, Clone, Default)]
pub struct InterfaceDescriptor {
    functions: BTreeMap<String, Function>,
}

impl InterfaceDescriptor {
    /// Parse a descriptor document
    pub fn from_json(json: &str) -> Result<Self> {
        let document: DescriptorDocument = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid interface descriptor: {}", e)))?;
        let entries = match document {
            DescriptorDocument::Bare(entries) => entries,
            DescriptorDocument::Artifact { abi } => abi,
        };

        let mut functions = BTreeMap::new();
        for entry in entries.iter().filter(|e| e.kind == "function") {
            if functions.contains_key(&entry.name) {
                debug!("Ignoring overload of {} in interface descriptor", entry.name);
                continue;
            }
            match Function::from_raw(entry) {
                Ok(function) => {
                    functions.insert(function.name.clone(), function);
                }
                Err(e) => warn!("Skipping function {} in interface descriptor: {}", entry.name, e),
            }
        }

        Ok(InterfaceDescriptor { functions })
    }

    /// Read and parse a descriptor file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "cannot read interface descriptor {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Descriptor of the certificate contract shipped with this crate
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_DESCRIPTOR)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Declared function for `op`, provided its mutability fits the operation.
    /// A transaction declared `view`, or a read declared state-changing, does not count.
    pub fn operation(&self, op: Operation) -> Option<&Function> {
        self.functions
            .get(op.name())
            .filter(|f| f.is_read_only() != op.is_state_changing())
    }

    /// Function whose selector prefixes `data`
    pub fn function_for_calldata(&self, data: &[u8]) -> Option<&Function> {
        let selector = data.get(..4)?;
        self.functions.values().find(|f| f.selector() == selector)
    }

    /// Declared function names, sorted
    pub fn operation_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    /// Names from `required` the descriptor does not declare with a fitting mutability
    pub fn missing(&self, required: &[Operation]) -> Vec<String> {
        required
            .iter()
            .filter(|op| self.operation(**op).is_none())
            .map(|op| op.name().to_string())
            .collect()
    }

    /// Drop a declared function
    pub fn remove(&mut self, name: &str) -> Option<Function> {
        self.functions.remove(name)
    }
}

// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Contract call data: loosely typed config arguments are decoded into
//! [`TypedArg`]s according to the function's declared input types, then
//! handed to a [`CallEncoder`].

use crate::errors::EmitterError;
use ethers::{
    abi::{Abi, Function, ParamType, Token},
    types::{Address, Bytes, I256, U256},
};
use num_bigint::{BigInt, Sign};
use serde_json::Value;
use std::{fmt, str::FromStr};

/// Declared kind of a function input, as far as argument decoding cares.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ArgKind {
    Address,
    Uint(usize),
    Int(usize),
    Bool,
    String,
    Unsupported(String),
}

impl ArgKind {
    fn from_param_type(param_type: &ParamType) -> Self {
        match param_type {
            ParamType::Address => ArgKind::Address,
            ParamType::Uint(bits) => ArgKind::Uint(*bits),
            ParamType::Int(bits) => ArgKind::Int(*bits),
            ParamType::Bool => ArgKind::Bool,
            ParamType::String => ArgKind::String,
            other => ArgKind::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Address => write!(f, "an address (hex string)"),
            ArgKind::Uint(bits) => write!(f, "uint{} (base-10 string)", bits),
            ArgKind::Int(bits) => write!(f, "int{} (base-10 string)", bits),
            ArgKind::Bool => write!(f, "a bool (true/false or 'true'/'false')"),
            ArgKind::String => write!(f, "a string"),
            ArgKind::Unsupported(name) => write!(f, "of a supported type, found {}", name),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub kind: ArgKind,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub inputs: Vec<ParamDescriptor>,
}

/// A function argument after decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypedArg {
    Address(Address),
    Integer(BigInt),
    Bool(bool),
    String(String),
}

/// Decodes `params` against the declared inputs of `function`.
///
/// Only the documented coercions are applied: addresses and integers must be
/// strings, booleans may be a bool or the strings `"true"`/`"false"`.
pub fn convert_params(
    function: &FunctionDescriptor,
    params: &[Value],
) -> Result<Vec<TypedArg>, EmitterError> {
    if function.inputs.len() != params.len() {
        return Err(EmitterError::ParameterCountMismatch {
            expected: function.inputs.len(),
            actual: params.len(),
        });
    }

    function
        .inputs
        .iter()
        .zip(params)
        .enumerate()
        .map(|(position, (input, param))| {
            convert_param(&input.kind, param).ok_or_else(|| EmitterError::ParameterConversion {
                position,
                expected: input.kind.clone(),
                value: param.to_string(),
            })
        })
        .collect()
}

fn convert_param(kind: &ArgKind, param: &Value) -> Option<TypedArg> {
    match (kind, param) {
        (ArgKind::Address, Value::String(s)) => parse_address(s).map(TypedArg::Address),
        (ArgKind::Uint(_) | ArgKind::Int(_), Value::String(s)) => {
            parse_integer(s).map(TypedArg::Integer)
        },
        (ArgKind::Bool, Value::Bool(b)) => Some(TypedArg::Bool(*b)),
        (ArgKind::Bool, Value::String(s)) => match s.as_str() {
            "true" => Some(TypedArg::Bool(true)),
            "false" => Some(TypedArg::Bool(false)),
            _ => None,
        },
        (ArgKind::String, Value::String(s)) => Some(TypedArg::String(s.clone())),
        _ => None,
    }
}

pub(crate) fn parse_address(s: &str) -> Option<Address> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Address::from_str(hex).ok()
}

fn parse_integer(s: &str) -> Option<BigInt> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    BigInt::from_str(s).ok()
}

/// Translates a function descriptor plus typed arguments into call data.
pub trait CallEncoder: Send + Sync {
    fn function(&self) -> &FunctionDescriptor;

    fn encode_call(&self, args: &[TypedArg]) -> Result<Bytes, EmitterError>;
}

/// Decodes `params` for the encoder's function and encodes the call.
pub fn encode_function_call(
    encoder: &dyn CallEncoder,
    params: &[Value],
) -> Result<Bytes, EmitterError> {
    let args = convert_params(encoder.function(), params)?;
    encoder.encode_call(&args)
}

/// [`CallEncoder`] over a Solidity JSON ABI.
#[derive(Clone, Debug)]
pub struct AbiCallEncoder {
    function: Function,
    descriptor: FunctionDescriptor,
}

impl AbiCallEncoder {
    /// Looks up `name` in the JSON `abi`. Overloaded functions resolve to the
    /// first declaration.
    pub fn from_abi_json(abi: &str, name: &str) -> Result<Self, EmitterError> {
        let abi: Abi = serde_json::from_str(abi)
            .map_err(|e| EmitterError::InvalidInterface(e.to_string()))?;
        let function = abi
            .function(name)
            .map_err(|_| EmitterError::UnknownFunction(name.to_string()))?
            .clone();
        let descriptor = FunctionDescriptor {
            name: function.name.clone(),
            inputs: function
                .inputs
                .iter()
                .map(|param| ParamDescriptor {
                    name: param.name.clone(),
                    kind: ArgKind::from_param_type(&param.kind),
                })
                .collect(),
        };
        Ok(Self {
            function,
            descriptor,
        })
    }

    fn to_token(&self, kind: &ArgKind, arg: &TypedArg) -> Result<Token, String> {
        match (kind, arg) {
            (ArgKind::Address, TypedArg::Address(address)) => Ok(Token::Address(*address)),
            (ArgKind::Uint(bits), TypedArg::Integer(value)) => {
                if value.sign() == Sign::Minus || value.bits() > *bits as u64 {
                    return Err(format!("{} does not fit uint{}", value, bits));
                }
                U256::from_dec_str(&value.to_string())
                    .map(Token::Uint)
                    .map_err(|e| e.to_string())
            },
            (ArgKind::Int(bits), TypedArg::Integer(value)) => {
                let magnitude = if value.sign() == Sign::Minus {
                    -value - 1
                } else {
                    value.clone()
                };
                if magnitude.bits() >= *bits as u64 {
                    return Err(format!("{} does not fit int{}", value, bits));
                }
                I256::from_dec_str(&value.to_string())
                    .map(|v| Token::Int(v.into_raw()))
                    .map_err(|e| e.to_string())
            },
            (ArgKind::Bool, TypedArg::Bool(b)) => Ok(Token::Bool(*b)),
            (ArgKind::String, TypedArg::String(s)) => Ok(Token::String(s.clone())),
            (kind, arg) => Err(format!("{:?} cannot be encoded as {}", arg, kind)),
        }
    }
}

impl CallEncoder for AbiCallEncoder {
    fn function(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn encode_call(&self, args: &[TypedArg]) -> Result<Bytes, EmitterError> {
        let encoding_error = |reason: String| EmitterError::Encoding {
            function: self.descriptor.name.clone(),
            reason,
        };
        if args.len() != self.descriptor.inputs.len() {
            return Err(EmitterError::ParameterCountMismatch {
                expected: self.descriptor.inputs.len(),
                actual: args.len(),
            });
        }
        let tokens = self
            .descriptor
            .inputs
            .iter()
            .zip(args)
            .map(|(input, arg)| self.to_token(&input.kind, arg))
            .collect::<Result<Vec<_>, _>>()
            .map_err(encoding_error)?;
        self.function
            .encode_input(&tokens)
            .map(Bytes::from)
            .map_err(|e| encoding_error(e.to_string()))
    }
}

use mlua::{Lua, MultiValue, Result as LuaResult, Value};

use super::ScriptError;
use crate::native_string::NativeString;
use crate::variant::Variant;

/// Converts one variant into a Lua value. Every numeric tag becomes a Lua
/// number, matching the single number type scripts see.
pub fn variant_to_lua<'lua>(lua: &'lua Lua, variant: &Variant) -> LuaResult<Value<'lua>> {
    Ok(match variant {
        Variant::None => Value::Nil,
        Variant::Boolean(value) => Value::Boolean(*value),
        Variant::UnsignedInt(value) => Value::Number(*value as f64),
        Variant::SignedInt(value) => Value::Number(*value as f64),
        Variant::Double(value) => Value::Number(*value),
        Variant::String(value) => Value::String(lua.create_string(value.as_bytes())?),
    })
}

/// Converts a script result back into a variant. Tables, functions and other
/// reference types have no variant form and come back as `None`.
pub fn variant_from_lua(value: &Value<'_>) -> Variant {
    match value {
        Value::Nil => Variant::None,
        Value::Boolean(value) => Variant::Boolean(*value),
        Value::Integer(value) => Variant::SignedInt(*value as i64),
        Value::Number(value) => number_to_variant(*value),
        Value::String(value) => Variant::String(NativeString::from_bytes(value.as_bytes())),
        _ => Variant::None,
    }
}

fn number_to_variant(value: f64) -> Variant {
    let integral = value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64;
    if integral {
        Variant::SignedInt(value as i64)
    } else {
        Variant::Double(value)
    }
}

/// Marshals a whole argument list up front, so a failing argument aborts the
/// call before anything reaches the VM.
pub fn marshal_args<'lua>(lua: &'lua Lua, function: &str, args: &[Variant]) -> Result<MultiValue<'lua>, ScriptError> {
    let mut values = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        let value = variant_to_lua(lua, arg).map_err(|err| ScriptError::Marshal {
            function: function.to_string(),
            index,
            message: err.to_string(),
        })?;
        values.push(value);
    }
    Ok(MultiValue::from_vec(values))
}

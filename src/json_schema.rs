//////////////////////////////////////////// JsonSchema ////////////////////////////////////////////

/// The JSON schema of a type, as advertised to the model for tool parameters.
///
/// Derive it for argument structs with `#[derive(JsonSchema)]` from `aicoder-derive`.
pub trait JsonSchema {
    /// Return the json_schema.  Does not depend on an object.
    fn json_schema() -> serde_json::Value;
}

macro_rules! primitive_schema {
    ($json_type:literal => $($ty:ty),+) => {
        $(
            impl JsonSchema for $ty {
                fn json_schema() -> serde_json::Value {
                    serde_json::json! {{ "type": $json_type }}
                }
            }
        )+
    };
}

primitive_schema!("boolean" => bool);
primitive_schema!("integer" => i8, i16, i32, i64, u8, u16, u32, u64, usize);
primitive_schema!("number" => f32, f64);
primitive_schema!("string" => String);

impl<T: JsonSchema> JsonSchema for Option<T> {
    fn json_schema() -> serde_json::Value {
        let mut res = <T as JsonSchema>::json_schema();
        res["nullable"] = true.into();
        res
    }
}

impl<T: JsonSchema> JsonSchema for Vec<T> {
    fn json_schema() -> serde_json::Value {
        serde_json::json! {{ "type": "array", "items": <T as JsonSchema>::json_schema() }}
    }
}

#![recursion_limit = "128"]

extern crate proc_macro;
#[macro_use]
extern crate quote;
extern crate syn;

use proc_macro2::TokenStream;
use syn::{parse_macro_input, DeriveInput};

use derive_util::StructVisitor;

////////////////////////////////////// #[derive(JsonSchema)] //////////////////////////////////////

/// Derive the JsonSchema trait for a struct with named fields.
///
/// Every field becomes a property.  Fields are required unless their type is an `Option`.
/// Doc comments on a field become the property's description.
#[proc_macro_derive(JsonSchema, attributes())]
pub fn derive_json_schema(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ty_name = input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let data = match input.data {
        syn::Data::Struct(ref ds) => ds,
        syn::Data::Enum(_) => {
            panic!("enums are not supported");
        }
        syn::Data::Union(_) => {
            panic!("unions are not supported");
        }
    };

    let mut jsv = JsonSchemaVisitor;
    let (value, required) = jsv.visit_struct(&ty_name, data);

    let gen = quote! {
        impl #impl_generics ::aicoder::JsonSchema for #ty_name #ty_generics #where_clause {
            fn json_schema() -> ::serde_json::Value {
                let mut result = ::serde_json::json!{{}};
                let mut properties = ::serde_json::json!{{}};
                #value
                result["type"] = "object".into();
                result["properties"] = properties;
                result["required"] = ::serde_json::Value::Array(vec![]);
                #required
                result
            }
        }
    };
    gen.into()
}

///////////////////////////////////////// JsonSchemaVisitor ////////////////////////////////////////

struct JsonSchemaVisitor;

impl StructVisitor for JsonSchemaVisitor {
    type Output = (TokenStream, TokenStream);

    fn visit_struct_named_fields(
        &mut self,
        _ty_name: &syn::Ident,
        _ds: &syn::DataStruct,
        fields: &syn::FieldsNamed,
    ) -> Self::Output {
        let mut result = quote! {};
        let mut required = quote! {};
        for field in fields.named.iter() {
            let Some(field_ident) = &field.ident else {
                continue;
            };
            let field_ident = field_ident.to_string();
            let field_ident = match field_ident.strip_prefix("r#") {
                Some(stripped) => stripped.to_string(),
                None => field_ident,
            };
            let field_type = field.ty.clone();
            result = quote! {
                #result
                properties[#field_ident] = <#field_type as ::aicoder::JsonSchema>::json_schema();
            };
            if let Some(description) = doc_comment(&field.attrs) {
                result = quote! {
                    #result
                    properties[#field_ident]["description"] = #description.into();
                };
            }
            if !is_option(&field.ty) {
                required = quote! {
                    #required
                    if let Some(::serde_json::Value::Array(arr)) = result.get_mut("required") {
                        arr.push(#field_ident.into())
                    }
                };
            }
        }
        (result, required)
    }
}

fn doc_comment(attrs: &[syn::Attribute]) -> Option<String> {
    let mut lines = vec![];
    for attr in attrs.iter().filter(|attr| attr.path.is_ident("doc")) {
        if let Ok(syn::Meta::NameValue(nv)) = attr.parse_meta() {
            if let syn::Lit::Str(s) = nv.lit {
                lines.push(s.value().trim().to_string());
            }
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

fn is_option(ty: &syn::Type) -> bool {
    match ty {
        syn::Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == "Option")
            .unwrap_or(false),
        _ => false,
    }
}

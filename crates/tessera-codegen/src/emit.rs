//! Rust source emission for a generated database.
//!
//! Produces one typed wrapper struct per contract, with an `async fn` per
//! operation whose arguments and result are typed from the descriptor, plus
//! a capability trait on `tessera_runtime::Database` exposing one accessor
//! per contract. Tokens are built with `quote` and pretty-printed with
//! `prettyplease`.

use proc_macro2::{Ident, Span, TokenStream};
use quote::{format_ident, quote};
use tessera_core::contract::{ParamDescriptor, ParamType, ReturnShape};
use tessera_core::types::DomainType;

use crate::error::CodegenError;
use crate::plan::{GeneratedContract, GeneratedDatabase, GeneratedOperation, OperationStatement};

/// Renders the typed access surface of `db` as a Rust source file.
pub fn emit_rust(db: &GeneratedDatabase) -> Result<String, CodegenError> {
    let tokens = emit_tokens(db)?;
    let file = syn::parse2::<syn::File>(tokens).map_err(|e| CodegenError::Emit(e.to_string()))?;
    Ok(prettyplease::unparse(&file))
}

/// The unformatted token stream behind [`emit_rust`].
pub fn emit_tokens(db: &GeneratedDatabase) -> Result<TokenStream, CodegenError> {
    let trait_name = ident(&format!("{}Access", pascal(&db.name)))?;
    let mut accessors = Vec::new();
    let mut accessor_impls = Vec::new();
    let mut wrappers = Vec::new();

    for contract in db.contracts.values() {
        let ty = ident(&pascal(&contract.name))?;
        let method = ident(&snake(&contract.name))?;
        let name = &contract.name;
        let doc = format!(" Access to the `{}` operations.", name);
        accessors.push(quote! {
            #[doc = #doc]
            fn #method(&self) -> Result<#ty, RuntimeError>;
        });
        accessor_impls.push(quote! {
            fn #method(&self) -> Result<#ty, RuntimeError> {
                Ok(#ty { dao: self.dao(#name)? })
            }
        });
        wrappers.push(emit_contract(contract, &ty)?);
    }

    let version = db.version();
    let header = format!(" Generated access objects for `{}` at schema version {}.", db.name, version);
    Ok(quote! {
        #![doc = #header]
        #![allow(dead_code, clippy::all)]

        use tessera_runtime::{Arg, Dao, Database, Record, RowStream, RuntimeError};

        pub const SCHEMA_VERSION: u32 = #version;

        pub trait #trait_name {
            #(#accessors)*
        }

        impl #trait_name for Database {
            #(#accessor_impls)*
        }

        #(#wrappers)*
    })
}

fn emit_contract(contract: &GeneratedContract, ty: &Ident) -> Result<TokenStream, CodegenError> {
    let methods = contract
        .operations
        .values()
        .map(emit_operation)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quote! {
        #[derive(Clone)]
        pub struct #ty {
            dao: Dao,
        }

        impl #ty {
            #(#methods)*
        }
    })
}

fn emit_operation(op: &GeneratedOperation) -> Result<TokenStream, CodegenError> {
    let method = ident(&op.name)?;
    let name = &op.name;
    let mut params = Vec::with_capacity(op.params.len());
    let mut args = Vec::with_capacity(op.params.len());
    for p in &op.params {
        let arg = ident(&p.name)?;
        let ty = param_type(p);
        params.push(quote!(#arg: #ty));
        args.push(match (&p.ty, p.collection) {
            (ParamType::Value(_), false) => quote!(Arg::value(#arg)),
            (ParamType::Value(_), true) => quote!(Arg::list(#arg)),
            (ParamType::Entity(_), _) => quote!(Arg::from(#arg)),
        });
    }
    let (ret, conversion) = return_type(&op.returns);
    let doc = match &op.statement {
        OperationStatement::Query(q) => format!(" `{}`", q.query.sql),
        OperationStatement::Write(w) => format!(" `{}`", w.sql),
    };
    Ok(quote! {
        #[doc = #doc]
        pub async fn #method(&self, #(#params),*) -> Result<#ret, RuntimeError> {
            self.dao.call(#name, vec![#(#args),*]).await?.#conversion
        }
    })
}

fn value_type(ty: &DomainType) -> TokenStream {
    match ty {
        DomainType::Bool => quote!(bool),
        DomainType::I8 => quote!(i8),
        DomainType::I16 => quote!(i16),
        DomainType::I32 => quote!(i32),
        DomainType::I64 => quote!(i64),
        DomainType::F32 => quote!(f32),
        DomainType::F64 => quote!(f64),
        DomainType::String => quote!(String),
        DomainType::Bytes => quote!(Vec<u8>),
        DomainType::Custom(_) => quote!(::serde_json::Value),
    }
}

fn param_type(p: &ParamDescriptor) -> TokenStream {
    let base = match &p.ty {
        ParamType::Value(ty) => value_type(ty),
        ParamType::Entity(_) => quote!(Record),
    };
    let base = if p.nullable { quote!(Option<#base>) } else { base };
    if p.collection {
        quote!(Vec<#base>)
    } else {
        base
    }
}

fn return_type(shape: &ReturnShape) -> (TokenStream, TokenStream) {
    match shape {
        ReturnShape::Void => (quote!(()), quote!(into_unit())),
        ReturnShape::RowCount => (quote!(u64), quote!(into_row_count())),
        ReturnShape::InsertedKey => (quote!(i64), quote!(into_key())),
        ReturnShape::InsertedKeys => (quote!(Vec<i64>), quote!(into_keys())),
        ReturnShape::Entity(_) => (quote!(Option<Record>), quote!(into_entity())),
        ReturnShape::EntityList(_) | ReturnShape::Rows => (quote!(RowStream), quote!(into_stream())),
        ReturnShape::Scalar(ty) => {
            let t = value_type(ty);
            (quote!(Option<#t>), quote!(into_scalar::<#t>()))
        }
        ReturnShape::ScalarList(ty) => {
            let t = value_type(ty);
            (quote!(Vec<#t>), quote!(into_scalars::<#t>()))
        }
    }
}

fn ident(name: &str) -> Result<Ident, CodegenError> {
    syn::parse_str::<Ident>(name)
        .map(|_| Ident::new(name, Span::call_site()))
        .or_else(|_| {
            // Keywords such as `type` or `match` become raw identifiers.
            syn::parse_str::<Ident>(&format!("r#{}", name))
                .map(|_| format_ident!("r#{}", name))
        })
        .map_err(|_| CodegenError::Emit(format!("'{}' is not a valid Rust identifier", name)))
}

fn pascal(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|c| c.to_ascii_uppercase().to_string() + chars.as_str())
                .unwrap_or_default()
        })
        .collect()
}

fn snake(name: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::generate;
    use tessera_core::contract::{AccessObjectContract, OperationDescriptor};
    use tessera_core::convert::ConverterRegistry;
    use tessera_core::database::DatabaseDescriptor;
    use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor};

    fn database() -> GeneratedDatabase {
        let item = EntityDescriptor::new("Item")
            .table("items")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("name", DomainType::String))
            .field(FieldDescriptor::new("price", DomainType::F64))
            .auto_key("id");
        let dao = AccessObjectContract::new("ItemDao")
            .operation(
                OperationDescriptor::query(
                    "cheaper_than",
                    "SELECT * FROM items WHERE price < :max",
                    ReturnShape::EntityList("Item".into()),
                )
                .param(ParamDescriptor::value("max", DomainType::F64)),
            )
            .operation(OperationDescriptor::query(
                "count",
                "SELECT COUNT(*) FROM items",
                ReturnShape::Scalar(DomainType::I64),
            ))
            .operation(
                OperationDescriptor::insert("add", "Item", ReturnShape::InsertedKey)
                    .param(ParamDescriptor::entity("item", "Item")),
            )
            .operation(
                OperationDescriptor::query(
                    "by_ids",
                    "SELECT * FROM items WHERE id IN (:ids)",
                    ReturnShape::EntityList("Item".into()),
                )
                .param(ParamDescriptor::value("ids", DomainType::I64).collection()),
            );
        let desc = DatabaseDescriptor::new("shop", 3).entity(item).contract(dao);
        generate(&desc, &ConverterRegistry::new()).unwrap()
    }

    fn methods(file: &syn::File, ty: &str) -> Vec<syn::ImplItemFn> {
        file.items
            .iter()
            .filter_map(|item| match item {
                syn::Item::Impl(imp) if imp.trait_.is_none() => Some(imp),
                _ => None,
            })
            .filter(|imp| {
                let self_ty = &imp.self_ty;
                quote!(#self_ty).to_string() == ty
            })
            .flat_map(|imp| imp.items.clone())
            .filter_map(|item| match item {
                syn::ImplItem::Fn(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn emits_parseable_source() {
        let source = emit_rust(&database()).unwrap();
        let file = syn::parse_file(&source).expect("emitted source should parse");
        let names: Vec<String> = methods(&file, "ItemDao")
            .iter()
            .map(|f| f.sig.ident.to_string())
            .collect();
        assert_eq!(names, vec!["cheaper_than", "count", "add", "by_ids"]);
        assert!(source.contains("pub trait ShopAccess"), "{}", source);
        assert!(source.contains("fn item_dao(&self)"), "{}", source);
        assert!(source.contains("SCHEMA_VERSION: u32 = 3u32"), "{}", source);
    }

    #[test]
    fn signatures_follow_descriptors() {
        let tokens = emit_tokens(&database()).unwrap().to_string();
        assert!(tokens.contains("max : f64"), "{}", tokens);
        assert!(tokens.contains("ids : Vec < i64 >"), "{}", tokens);
        assert!(tokens.contains("Option < i64 >"), "{}", tokens);
        assert!(tokens.contains("item : Record"), "{}", tokens);
        assert!(tokens.contains("Arg :: list (ids)"), "{}", tokens);
        assert!(tokens.contains("into_stream ()"), "{}", tokens);
    }

    #[test]
    fn naming_helpers() {
        assert_eq!(pascal("shop_db"), "ShopDb");
        assert_eq!(snake("ItemDao"), "item_dao");
        assert_eq!(ident("type").unwrap().to_string(), "r#type");
        assert!(ident("two words").is_err());
    }
}

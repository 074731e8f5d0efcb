use quote::ToTokens;
use syn::{Attribute, Field, FieldsNamed, Ident, Token, Type, punctuated::Punctuated};

// 拆出已有 derive 列表，保留其余属性
fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<syn::Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();
    for attr in attrs {
        let parsed = attr.path().is_ident("derive").then(|| {
            attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
        });
        match parsed {
            Some(Ok(list)) => existing.extend(list),
            _ => retained.push(attr.clone()),
        }
    }
    (retained, existing)
}

// Serialize 与 serde::Serialize 视为同一个 derive
fn derive_key(path: &syn::Path) -> String {
    match path.segments.last() {
        Some(last) => last.ident.to_string(),
        None => path.to_token_stream().to_string(),
    }
}

/// 把 `required` 合并进已有 derive（去重），合并后的 derive 置于最前
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let (retained, existing) = split_derives(attrs);

    let mut seen = std::collections::HashSet::<String>::new();
    let merged: Vec<syn::Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();

    let derive: Attribute = syn::parse_quote!(#[derive(#(#merged),*)]);
    *attrs = std::iter::once(derive).chain(retained).collect();
}

/// 缺少同名字段时在最前插入 `name: ty`；已存在则保持原样
pub(crate) fn ensure_leading_field(fields: &mut FieldsNamed, name: &Ident, ty: &Type) {
    let exists = fields
        .named
        .iter()
        .any(|f| f.ident.as_ref().is_some_and(|i| i == name));
    if exists {
        return;
    }

    let field: Field = syn::parse_quote! { #name: #ty };
    let mut named: Punctuated<Field, Token![,]> = Punctuated::new();
    named.push(field);
    named.extend(fields.named.clone());
    fields.named = named;
}

use crate::utils::{apply_derives, ensure_leading_field};
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Ident, Item, LitStr, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input,
};

/// #[event] 宏实现
/// - 仅支持具名字段结构体
/// - 缺少 `header` 字段时在最前追加 `header: ::eventify::event::EventHeader`
/// - 合并派生：Debug, Clone, Serialize, Deserialize
/// - 生成 `Event` 与 `TypedEvent` 实现
/// - 参数：`type = "..."`（默认结构体名），`backend = "local" | "remote"`
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    let st = match &mut input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[event] can only be used on struct types")
                .to_compile_error()
                .into();
        }
    };

    let syn::Fields::Named(fields_named) = &mut st.fields else {
        return syn::Error::new(st.span(), "#[event] only supports named-field structs")
            .to_compile_error()
            .into();
    };

    let header_ident = format_ident!("header");
    let header_ty: Type = syn::parse_quote! { ::eventify::event::EventHeader };
    ensure_leading_field(fields_named, &header_ident, &header_ty);

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    apply_derives(&mut st.attrs, required);

    let ident = st.ident.clone();
    let generics = st.generics.clone();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let event_type = cfg
        .event_type
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));

    let backend_fn: Option<proc_macro2::TokenStream> = cfg.backend.map(|backend| {
        quote! {
            fn backend(&self) -> ::core::option::Option<::eventify::dispatch::BackendKind> {
                ::core::option::Option::Some(::eventify::dispatch::BackendKind::#backend)
            }
        }
    });

    let out = quote! {
        #input

        impl #impl_generics ::eventify::event::Event for #ident #ty_generics #where_clause {
            fn header(&self) -> &::eventify::event::EventHeader {
                &self.header
            }

            fn event_type(&self) -> &'static str {
                <Self as ::eventify::event::TypedEvent>::EVENT_TYPE
            }

            #backend_fn
        }

        impl #impl_generics ::eventify::event::TypedEvent for #ident #ty_generics #where_clause {
            const EVENT_TYPE: &'static str = #event_type;
        }
    };

    TokenStream::from(out)
}

// -------- parsing --------

#[derive(Default)]
struct EventAttrConfig {
    event_type: Option<LitStr>,
    backend: Option<Ident>,
}

struct EventAttrKv {
    key: Ident,
    value: LitStr,
}

impl Parse for EventAttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        // `type` 是关键字，需要 parse_any
        let key = input.call(Ident::parse_any)?;
        input.parse::<Token![=]>()?;
        let value = input.parse::<LitStr>()?;
        Ok(Self { key, value })
    }
}

impl Parse for EventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = EventAttrConfig::default();
        let pairs = Punctuated::<EventAttrKv, Token![,]>::parse_terminated(input)?;

        for kv in pairs {
            match kv.key.to_string().as_str() {
                "type" => {
                    if cfg.event_type.is_some() {
                        return Err(syn::Error::new(kv.key.span(), "duplicate key 'type'"));
                    }
                    if kv.value.value().is_empty() {
                        return Err(syn::Error::new(
                            kv.value.span(),
                            "event type must not be empty",
                        ));
                    }
                    cfg.event_type = Some(kv.value);
                }
                "backend" => {
                    if cfg.backend.is_some() {
                        return Err(syn::Error::new(kv.key.span(), "duplicate key 'backend'"));
                    }
                    let variant = match kv.value.value().as_str() {
                        "local" => "Local",
                        "remote" => "Remote",
                        _ => {
                            return Err(syn::Error::new(
                                kv.value.span(),
                                "backend must be \"local\" or \"remote\"",
                            ));
                        }
                    };
                    cfg.backend = Some(Ident::new(variant, kv.value.span()));
                }
                _ => {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "unknown key; expected 'type' or 'backend'",
                    ));
                }
            }
        }

        Ok(cfg)
    }
}

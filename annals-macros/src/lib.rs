// These lints are triggered by darling's generated code for
// `#[darling(default)]`.
#![allow(clippy::option_if_let_else)]
#![allow(clippy::needless_continue)]

use darling::{FromDeriveInput, FromMeta, ast::NestedMeta, util::PathList};
use heck::{ToKebabCase, ToUpperCamelCase};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, quote};
use syn::{DeriveInput, Ident, Path, parse_macro_input};

#[allow(clippy::doc_markdown, reason = "false positive")]
/// Build a PascalCase enum variant name from a type path.
fn path_to_pascal_ident(path: &Path) -> Ident {
    let combined = path
        .segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("_");
    let pascal = combined.to_upper_camel_case();
    let span = path
        .segments
        .last()
        .map_or_else(proc_macro2::Span::call_site, |segment| segment.ident.span());
    Ident::new(&pascal, span)
}

/// Parse `key = Type` meta items into a `syn::Type`.
fn parse_name_value_type(item: &syn::Meta) -> darling::Result<syn::Type> {
    let error = || darling::Error::unsupported_shape("expected `key = Type`");
    let syn::Meta::NameValue(nv) = item else {
        return Err(error());
    };
    syn::parse2(nv.value.to_token_stream()).map_err(|_| error())
}

/// Returns the kind override or the default kebab-case name from the ident.
fn default_kind(ident: &Ident, kind: Option<String>) -> String {
    kind.unwrap_or_else(|| ident.to_string().to_kebab_case())
}

/// Wrapper for `syn::Path` that parses from `key = Type` syntax.
#[derive(Debug, Clone)]
struct TypePath(Path);

impl FromMeta for TypePath {
    fn from_meta(item: &syn::Meta) -> darling::Result<Self> {
        let ty = parse_name_value_type(item)?;
        match ty {
            syn::Type::Path(type_path) if type_path.qself.is_none() => Ok(Self(type_path.path)),
            _ => Err(darling::Error::unsupported_shape("expected `key = Type`")),
        }
    }
}

/// List of type identities written as string literals: `interfaces("a", "b")`.
#[derive(Debug, Clone, Default)]
struct KindList(Vec<String>);

impl FromMeta for KindList {
    fn from_list(items: &[NestedMeta]) -> darling::Result<Self> {
        let mut errors = darling::Error::accumulator();
        let kinds = items
            .iter()
            .filter_map(|item| match item {
                NestedMeta::Lit(syn::Lit::Str(kind)) => Some(kind.value()),
                other => {
                    errors.push(
                        darling::Error::custom("expected a string literal type identity")
                            .with_span(other),
                    );
                    None
                }
            })
            .collect();
        errors.finish_with(Self(kinds))
    }
}

/// Configuration for the `#[aggregate(...)]` attribute.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(aggregate), supports(struct_named))]
struct AggregateArgs {
    ident: Ident,
    vis: syn::Visibility,
    id: TypePath,
    error: TypePath,
    events: PathList,
    #[darling(default)]
    kind: Option<String>,
    /// Field holding the aggregate's `Option<Id>`.
    #[darling(default)]
    identity: Option<String>,
    #[darling(default)]
    event_enum: Option<String>,
    #[darling(default)]
    derives: Option<PathList>,
    /// Function registering extra handlers (interfaces, ancestors) after the
    /// per-event ones.
    #[darling(default)]
    register: Option<TypePath>,
}

/// Configuration for the `#[event(...)]` attribute.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(event), supports(struct_any))]
struct DomainEventArgs {
    ident: Ident,
    #[darling(default)]
    kind: Option<String>,
    #[darling(default)]
    interfaces: KindList,
    #[darling(default)]
    ancestors: KindList,
}

/// Captures the event type path and its generated enum variant identifier.
struct EventSpec<'a> {
    path: &'a Path,
    variant: Ident,
}

impl<'a> EventSpec<'a> {
    /// Build an event spec from a type path.
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            variant: path_to_pascal_ident(path),
        }
    }
}

/// Parse derive input with darling and render errors as tokens.
fn parse_or_error<T, F>(input: &DeriveInput, f: F) -> TokenStream2
where
    T: FromDeriveInput,
    F: FnOnce(T) -> TokenStream2,
{
    match T::from_derive_input(input) {
        Ok(args) => f(args),
        Err(err) => err.write_errors(),
    }
}

/// Derives the `Aggregate` trait for a struct.
///
/// This macro generates:
/// - An event enum containing all aggregate event types, with serde support
/// - `EventType` forwarding each variant's kind, interfaces and ancestors
/// - `EventVariant<E>` and `From<E>` implementations for each event type
/// - `Aggregate` implementation registering every `Apply<E>` as a handler
///
/// **Note:** Commands are handled via individual `Handle<C>` trait
/// implementations. No command enum is generated.
///
/// # Attributes
///
/// ## Required
/// - `id = Type` - Aggregate ID type
/// - `error = Type` - Error type for command handling
/// - `events(Type1, Type2, ...)` - Event types, each implementing
///   `DomainEvent` and with a matching `Apply<E>` implementation
///
/// ## Optional
/// - `kind = "name"` - Aggregate type identifier (default: kebab-case struct
///   name)
/// - `identity = "field"` - Field of type `Option<Id>` holding the identity
///   (default: `id`)
/// - `event_enum = "Name"` - Override generated event enum name (default:
///   `{Struct}Event`)
/// - `derives(Trait1, Trait2, ...)` - Additional derives for the generated
///   event enum. Always includes `Clone`, `serde::Serialize` and
///   `serde::Deserialize`
/// - `register = path` - `fn(&mut ApplyHandlers<Self>)` called after the
///   per-event handlers, for interface and ancestor handlers
///
/// # Example
///
/// ```ignore
/// #[derive(Default, Aggregate)]
/// #[aggregate(
///     id = u64,
///     error = String,
///     events(OrderPlaced, OrderShipped),
///     derives(Debug, PartialEq, Eq),
///     register = SalesOrder::register_audit
/// )]
/// pub struct SalesOrder {
///     id: Option<u64>,
///     shipped: bool,
/// }
/// ```
#[proc_macro_derive(Aggregate, attributes(aggregate))]
pub fn derive_aggregate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    derive_aggregate_impl(&input).into()
}

/// Internal entry point that returns tokens for the aggregate derive.
fn derive_aggregate_impl(input: &DeriveInput) -> TokenStream2 {
    parse_or_error::<AggregateArgs, _>(input, |args| generate_aggregate_impl(args, input))
}

/// Generate the aggregate derive implementation tokens.
fn generate_aggregate_impl(args: AggregateArgs, input: &DeriveInput) -> TokenStream2 {
    let event_specs: Vec<EventSpec<'_>> = args.events.iter().map(EventSpec::new).collect();

    if event_specs.is_empty() {
        return darling::Error::custom("events(...) must contain at least one event type")
            .with_span(&input.ident)
            .write_errors();
    }

    let struct_name = &args.ident;
    let struct_vis = &args.vis;
    let id_type = &args.id.0;
    let error_type = &args.error.0;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let kind = default_kind(struct_name, args.kind);
    let identity = Ident::new(
        args.identity.as_deref().unwrap_or("id"),
        struct_name.span(),
    );

    let event_enum_name = args.event_enum.map_or_else(
        || Ident::new(&format!("{struct_name}Event"), struct_name.span()),
        |name| Ident::new(&name, struct_name.span()),
    );

    let event_types: Vec<&Path> = event_specs.iter().map(|spec| spec.path).collect();
    let variant_names: Vec<&Ident> = event_specs.iter().map(|spec| &spec.variant).collect();

    // Clone and serde are always present; user-specified traits are appended
    let user_derives = args.derives.unwrap_or_default();
    let derives = quote! {
        #[derive(Clone, ::serde::Serialize, ::serde::Deserialize, #(#user_derives),*)]
    };

    let register_extra = args.register.map(|TypePath(path)| quote! { #path(handlers); });

    quote! {
        #[doc = concat!("Event type for the [`", stringify!(#struct_name), "`] aggregate.")]
        #derives
        #struct_vis enum #event_enum_name {
            #(
                #[doc = concat!("[`", stringify!(#event_types), "`]")]
                #variant_names(#event_types)
            ),*
        }

        impl ::annals::event::EventType for #event_enum_name {
            fn kind(&self) -> &'static str {
                match self {
                    #(Self::#variant_names(_) => <#event_types as ::annals::event::DomainEvent>::KIND),*
                }
            }

            fn interfaces(&self) -> &'static [&'static str] {
                match self {
                    #(Self::#variant_names(_) => <#event_types as ::annals::event::DomainEvent>::INTERFACES),*
                }
            }

            fn ancestors(&self) -> &'static [&'static str] {
                match self {
                    #(Self::#variant_names(_) => <#event_types as ::annals::event::DomainEvent>::ANCESTORS),*
                }
            }
        }

        #(
            impl ::annals::event::EventVariant<#event_types> for #event_enum_name {
                #[allow(unreachable_patterns)]
                fn as_variant(&self) -> ::core::option::Option<&#event_types> {
                    match self {
                        Self::#variant_names(event) => ::core::option::Option::Some(event),
                        _ => ::core::option::Option::None,
                    }
                }
            }

            impl ::core::convert::From<#event_types> for #event_enum_name {
                fn from(event: #event_types) -> Self {
                    Self::#variant_names(event)
                }
            }
        )*

        impl #impl_generics ::annals::Aggregate for #struct_name #ty_generics #where_clause {
            const KIND: &'static str = #kind;
            type Event = #event_enum_name;
            type Error = #error_type;
            type Id = #id_type;

            fn id(&self) -> ::core::option::Option<&Self::Id> {
                self.#identity.as_ref()
            }

            fn register_handlers(handlers: &mut ::annals::dispatch::ApplyHandlers<Self>) {
                #(handlers.apply::<#event_types>();)*
                #register_extra
            }
        }
    }
}

/// Derives the `DomainEvent` trait for a struct.
///
/// # Attributes
///
/// All optional:
/// - `kind = "name"` - Stable event type identifier (default: kebab-case
///   struct name)
/// - `interfaces("a", "b", ...)` - Type identities this event provides,
///   dispatched before its own kind
/// - `ancestors("a", "b", ...)` - More general event types, most-derived
///   first, dispatched after its own kind
///
/// # Example
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, DomainEvent)]
/// #[event(interfaces("sales-order-event"), ancestors("order-changed"))]
/// pub struct OrderShipped {
///     pub carrier: String,
/// }
/// ```
#[proc_macro_derive(DomainEvent, attributes(event))]
pub fn derive_domain_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    derive_domain_event_impl(&input).into()
}

/// Internal entry point that returns tokens for the event derive.
fn derive_domain_event_impl(input: &DeriveInput) -> TokenStream2 {
    parse_or_error::<DomainEventArgs, _>(input, |args| generate_domain_event_impl(args, input))
}

/// Generate the event derive implementation tokens.
fn generate_domain_event_impl(args: DomainEventArgs, input: &DeriveInput) -> TokenStream2 {
    let struct_name = &args.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let kind = default_kind(struct_name, args.kind);
    let interfaces = &args.interfaces.0;
    let ancestors = &args.ancestors.0;

    quote! {
        impl #impl_generics ::annals::event::DomainEvent for #struct_name #ty_generics #where_clause {
            const KIND: &'static str = #kind;
            const INTERFACES: &'static [&'static str] = &[#(#interfaces),*];
            const ANCESTORS: &'static [&'static str] = &[#(#ancestors),*];
        }
    }
}

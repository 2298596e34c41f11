use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, Data, DataEnum, DeriveInput, Error, Fields, Ident, Type};

/// Derives the [`EthLogDecode`] trait for an enum multiplexing several events.
///
/// Besides the trait the derive emits an inherent `signatures()` function returning
/// the `topic0` of every variant in declaration order, so a log filter can be built
/// for exactly the events the enum is able to decode.
///
/// Derivation is only possible for `enum`s with single-value unnamed variants.
///
/// # Examples:
///
/// ```
/// use ethers::prelude::{EthEvent, EthLogDecode};
/// use ethers::types::{Address, H256, U256};
/// use ethers_log_decode::EthLogDecode;
///
/// #[derive(Debug, Clone, EthEvent)]
/// #[ethevent(name = "RelayedUpwardMessage")]
/// struct RelayedUpward {
///     #[ethevent(indexed)]
///     message_hash: H256,
///     #[ethevent(indexed)]
///     nonce: U256,
/// }
///
/// #[derive(Debug, Clone, EthEvent)]
/// #[ethevent(name = "Transfer")]
/// struct Transfer {
///     #[ethevent(indexed)]
///     from: Address,
///     #[ethevent(indexed)]
///     to: Address,
///     value: U256,
/// }
///
/// #[derive(EthLogDecode)]
/// enum Events {
///     Relayed(RelayedUpward),
///     Transfer(Transfer),
/// }
///
/// assert_eq!(Events::signatures().len(), 2);
/// ```
///
/// The variant types should all be different:
///
/// ```compile_fail
/// use ethers::prelude::{EthEvent, EthLogDecode};
/// use ethers::types::{H256, U256};
/// use ethers_log_decode::EthLogDecode;
///
/// #[derive(Debug, Clone, EthEvent)]
/// #[ethevent(name = "RelayedUpwardMessage")]
/// struct RelayedUpward {
///     #[ethevent(indexed)]
///     message_hash: H256,
///     #[ethevent(indexed)]
///     nonce: U256,
/// }
///
/// #[derive(EthLogDecode)]
/// enum Events {
///     Relayed(RelayedUpward),
///     RelayedAgain(RelayedUpward),
/// }
/// ```
///
/// [`EthLogDecode`]: https://docs.rs/ethers/latest/ethers/contract/trait.EthLogDecode.html
#[proc_macro_derive(EthLogDecode)]
pub fn eth_log_decode_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let variants = match input.data {
        Data::Enum(ref e) => variant_types(&input, e),
        Data::Struct(_) => Err(Error::new(
            input.span(),
            "EthLogDecode cannot be derived for structures",
        )),
        Data::Union(_) => Err(Error::new(
            input.span(),
            "EthLogDecode cannot be derived for unions",
        )),
    };

    let (idents, types): (Vec<Ident>, Vec<Type>) = match variants {
        Ok(v) => v.into_iter().unzip(),
        Err(e) => return e.to_compile_error().into(),
    };

    let name = &input.ident;

    quote! {
        impl ethers::prelude::EthLogDecode for #name {
            fn decode_log(log: &ethers::abi::RawLog) -> core::result::Result<Self, ethers::abi::Error> {
                #(
                    if let Ok(a) = <#types as ethers::prelude::EthLogDecode>::decode_log(log) {
                        return Ok(#name::#idents(a));
                    }
                )*

                Err(ethers::abi::Error::InvalidData)
            }
        }

        impl #name {
            /// `topic0` of every event this enum decodes.
            pub fn signatures() -> ::std::vec::Vec<ethers::types::H256> {
                vec![#(<#types as ethers::contract::EthEvent>::signature()),*]
            }
        }
    }
    .into()
}

fn variant_types(input: &DeriveInput, e: &DataEnum) -> Result<Vec<(Ident, Type)>, Error> {
    let mut res: Vec<(Ident, Type)> = vec![];

    for variant in e.variants.iter() {
        let ty = match &variant.fields {
            Fields::Unnamed(u) if u.unnamed.len() == 1 => u.unnamed[0].ty.clone(),
            Fields::Unnamed(_) => {
                return Err(Error::new(
                    variant.span(),
                    "EthLogDecode can only be derived for enum with unnamed fields with a single field",
                ))
            }
            _ => {
                return Err(Error::new(
                    variant.span(),
                    "EthLogDecode can only be derived for enum with unnamed fields",
                ))
            }
        };

        if res.iter().any(|(_, t)| t == &ty) {
            return Err(Error::new(
                input.span(),
                "EthLogDecode enum should contain variants of different types",
            ));
        }

        res.push((variant.ident.clone(), ty));
    }

    Ok(res)
}

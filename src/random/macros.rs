/// Declares one or more stream keys for [`RandomStreams`](crate::random::RandomStreams). Each
/// key's name is hashed into the seed of its stream, so two keys never share draws.
#[macro_export]
macro_rules! define_rng {
    ($($stream:ident),+ $(,)?) => {
        $(
            #[derive(Copy, Clone)]
            struct $stream;

            impl $crate::random::RngId for $stream {
                type RngType = $crate::rand::rngs::SmallRng;

                fn get_name() -> &'static str {
                    stringify!($stream)
                }
            }

            // Link-time collision if a stream name is declared twice
            $crate::paste::paste! {
                #[doc(hidden)]
                #[no_mangle]
                #[allow(non_upper_case_globals)]
                pub static [<episim_rng_stream_ $stream>]: () = ();
            }
        )+
    };
}
pub use define_rng;

pub use enclose::*;

/// Creates and runs an effect, cloning the listed captures into it.
///
/// ```
/// use reactivity::{effect, reactive, Target};
///
/// let state = reactive(Target::record());
/// let _log = effect!((state) => {
///     let _ = state.as_observed().map(|s| s.get("count"));
/// });
/// ```
#[macro_export]
macro_rules! effect {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::effect($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }), $crate::EffectOptions::default())
    };
    (=> $($b:tt)*) => {
        $crate::effect(move || { $($b)* }, $crate::EffectOptions::default())
    };
}

#[macro_export]
macro_rules! computed {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::computed($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    (=> $($b:tt)*) => {
        $crate::computed(move || { $($b)* })
    };
}

/// Builds a raw record target: `record! { "a" => 1, "b" => "two" }`.
#[macro_export]
macro_rules! record {
    () => {
        $crate::Target::record()
    };
    ($( $k:expr => $v:expr ),+ $(,)?) => {
        $crate::Target::from_record([$( ($k, $crate::Value::from($v)) ),+])
    };
}

#[macro_export]
macro_rules! list {
    () => {
        $crate::Target::list()
    };
    ($( $v:expr ),+ $(,)?) => {
        $crate::Target::from_list([$( $crate::Value::from($v) ),+])
    };
}

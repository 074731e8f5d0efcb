mod event;
mod utils;

use proc_macro::TokenStream;

/// 事件宏
/// - 作用于具名字段结构体，缺少时追加 `header: ::eventify::event::EventHeader`
/// - 合并派生 `Debug, Clone, serde::Serialize, serde::Deserialize`
/// - 实现 `::eventify::event::Event` 与 `::eventify::event::TypedEvent`
/// - 参数：`#[event(type = "order.placed", backend = "remote")]`，均可省略；
///   `type` 默认取结构体名
#[proc_macro_attribute]
pub fn event(attr: TokenStream, item: TokenStream) -> TokenStream {
    event::expand(attr, item)
}

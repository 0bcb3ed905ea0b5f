//! Parser Module
//!
//! XLSXパッケージを読み取り、変換用の`Workbook`を組み立てるモジュール。
//! セル値はcalamine、シート状態・画像・文書プロパティはパッケージのXMLから直接取得します。

mod package;
mod workbook;

pub(crate) use package::PackageInfo;
pub(crate) use workbook::WorkbookParser;

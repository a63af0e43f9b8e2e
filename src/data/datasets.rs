//! One named loader per registered dataset. Each only fixes the dataset name
//! and dereferences to [`DatasetLoader`].

use std::ops::Deref;
use std::path::Path;

use super::loader::DatasetLoader;
use crate::config::LoaderConfig;
use crate::error::Result;

macro_rules! dataset_loaders {
    ($($(#[$doc:meta])* $ty:ident => $name:literal,)+) => {
        $(
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $ty(DatasetLoader);

            impl $ty {
                pub const NAME: &'static str = $name;

                pub fn new(dir_path: Option<&Path>) -> Result<Self> {
                    DatasetLoader::new(Some($name), dir_path).map(Self)
                }

                pub fn with_config(dir_path: Option<&Path>, config: LoaderConfig) -> Result<Self> {
                    DatasetLoader::with_config(Some($name), dir_path, config).map(Self)
                }

                pub fn into_inner(self) -> DatasetLoader {
                    self.0
                }
            }

            impl Deref for $ty {
                type Target = DatasetLoader;

                fn deref(&self) -> &DatasetLoader {
                    &self.0
                }
            }
        )+

        /// Names of every specialised loader, in declaration order.
        pub const LOADER_NAMES: &[&str] = &[$($name),+];
    };
}

dataset_loaders! {
    /// MAVEN general-domain event detection corpus.
    Maven => "MAVEN",
    /// Twitter Event2012 corpus.
    Event2012 => "Event2012",
    /// French Twitter Event2018 corpus.
    Event2018 => "Event2018",
    ArabicTwitter => "Arabic_Twitter",
    CrisisLexT26 => "CrisisLexT26",
    CrisisLexT6 => "CrisisLexT6",
    CrisisMmd => "CrisisMMD",
    CrisisNlp => "CrisisNLP",
    HumAid => "HumAID",
    Icwsm2018 => "ICWSM2018",
    Iscram2013 => "ISCRAM2013",
    BigCrisisData => "BigCrisisData",
    Kbp => "KBP",
    /// 100-event sample of Event2012.
    Event2012Sample100 => "Event2012_100",
    /// 100-event sample of Event2018.
    Event2018Sample100 => "Event2018_100",
    /// 100-event sample of the Arabic corpus.
    ArabicSample100 => "Arabic_100",
}

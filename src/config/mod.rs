mod settings;

pub use settings::{
    AuxiliaryTokenSettings, ChainSettings, CronSettings, PortfolioSettings, PostgresSettings,
    PriceFeedSettings, Settings, SubgraphSettings,
};

mod insight_dto;

pub use insight_dto::{
    ActivityContextDto, ContactContextDto, DealContextDto, DealInsightRequestDto,
    DealInsightsDto, ForecastRequestDto, SalesForecastDto,
};

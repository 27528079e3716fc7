/// Fit/transform lifecycle shared by the pipeline stages of this crate.
///
/// Calling `fit` before `transform` is the convention, but stages without
/// learned state accept `transform` on their own.
pub trait Transformer<I: ?Sized> {
    type Output;

    /// Learn whatever state the stage needs from `input`
    fn fit(&mut self, input: &I) -> anyhow::Result<&mut Self>;

    /// Apply the stage to `input`
    fn transform(&self, input: &I) -> anyhow::Result<Self::Output>;

    /// Fit the stage and transform the same input in a single operation
    fn fit_transform(&mut self, input: &I) -> anyhow::Result<Self::Output> {
        self.fit(input)?;
        self.transform(input)
    }
}

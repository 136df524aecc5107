use anyhow::Context;

use crate::entities::{AnalysisSummary, ClassifiedResult, LabAnalysis};

pub mod html;
pub mod markdown;

pub trait Render {
    type Output;
    fn render<R: Renderer>(&self, renderer: &mut R) -> anyhow::Result<Self::Output>;
}

pub trait Renderer {
    type Ok;

    fn render_summary(&mut self, summary: &AnalysisSummary) -> anyhow::Result<Self::Ok>;

    fn render_result(&mut self, result: &ClassifiedResult) -> anyhow::Result<Self::Ok>;
}

impl Render for &[ClassifiedResult] {
    type Output = ();

    fn render<R: Renderer>(&self, renderer: &mut R) -> anyhow::Result<()> {
        renderer
            .render_summary(&AnalysisSummary::from_results(self))
            .context("can't render summary")?;
        for result in self.iter() {
            renderer
                .render_result(result)
                .context("can't render result")?;
        }
        Ok(())
    }
}

impl Render for &LabAnalysis {
    type Output = ();

    fn render<R: Renderer>(&self, renderer: &mut R) -> anyhow::Result<()> {
        self.results.as_slice().render(renderer)
    }
}

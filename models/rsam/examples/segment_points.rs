use rsam::{Sam, SamPrompt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let sam = Sam::builder().build().await?;
    let image = image::open("examples/landscape.jpg")?;

    let mut predictor = sam.predictor();
    predictor.set_image(&image)?;

    let prediction = predictor.predict(
        &SamPrompt::new()
            .add_goal_point(0.5, 0.25)
            .add_avoid_point(0.1, 0.9)
            .multimask(true),
    )?;
    for (i, mask) in prediction.masks().iter().enumerate() {
        println!("candidate {i}: predicted iou {:?}", mask.score());
        mask.to_image().save(format!("mask_{i}.png"))?;
    }

    Ok(())
}
